//! Runtime — the single-threaded event loop driving frame ticks and IPC.
//!
//! One calloop `EventLoop` serializes everything: the IPC listener and
//! client traffic dispatch between ticks, and each loop iteration
//! advances the viewer state by the measured wall-time delta.  Gesture
//! handling and dwell progression therefore never run concurrently.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::EventLoop;
use tracing::info;

use crate::ipc::IpcServer;
use crate::scene::Viewport;
use crate::state::ViewerState;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Runtime configuration assembled from the CLI.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// IPC socket path override.
    pub ipc_socket: Option<PathBuf>,
    /// Log all IPC messages.
    pub ipc_trace: bool,
    /// Tick rate in Hz.
    pub tick_hz: u32,
    /// Exit after N seconds (CI testing).
    pub exit_after: Option<u64>,
    /// Overlay viewport dimensions.
    pub viewport: Viewport,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ipc_socket: None,
            ipc_trace: false,
            tick_hz: 60,
            exit_after: None,
            viewport: Viewport::default(),
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the viewer until shutdown.
pub fn run(config: RuntimeConfig) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<ViewerState>::try_new()?;

    let ipc_path = config
        .ipc_socket
        .clone()
        .unwrap_or_else(IpcServer::default_socket_path);
    let mut state = ViewerState::new(ipc_path.clone(), config.viewport.clone());
    state.ipc_server.ipc_trace = config.ipc_trace;
    IpcServer::bind(&ipc_path, &event_loop.handle())?;

    install_signal_handlers();

    let tick_hz = config.tick_hz.max(1);
    let tick_interval = Duration::from_secs_f64(1.0 / tick_hz as f64);
    state.timing.budget_ms = tick_interval.as_secs_f64() * 1000.0;

    let start_time = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let mut last_tick = Instant::now();
    let mut last_status_log = Instant::now();
    let status_interval = Duration::from_secs(60);

    info!("runtime initialized at {} Hz, entering event loop", tick_hz);

    while state.running {
        // Check global shutdown flag (set by signal handler)
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("shutdown signal received, exiting");
            state.running = false;
            break;
        }

        // Exit timer for CI
        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        // Periodic status logging
        if last_status_log.elapsed() >= status_interval {
            info!(
                "status: {} IPC client(s), clock {:.0}ms",
                state.ipc_server.clients.len(),
                state.clock_ms,
            );
            last_status_log = Instant::now();
        }

        // Wait out the tick interval while servicing IPC readiness.
        event_loop.dispatch(Some(tick_interval), &mut state)?;
        IpcServer::poll_clients(&mut state);

        // Advance the session by measured wall time.
        let now = Instant::now();
        let dt_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
        last_tick = now;
        state.tick(dt_ms);

        // Broadcast whatever this iteration produced.
        for event in state.take_pending_events() {
            IpcServer::broadcast_event(&mut state, &event);
        }
    }

    // Clean up IPC socket
    let _ = std::fs::remove_file(&state.ipc_server.socket_path);

    info!(
        "runtime shutting down ({} IPC client(s))",
        state.ipc_server.clients.len(),
    );
    Ok(())
}
