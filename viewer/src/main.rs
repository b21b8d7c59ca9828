//! Orrery viewer — gesture-driven solar-system visualization core.
//!
//! Consumes hand-gesture and landmark frames over IPC and drives camera
//! manipulation, pointing selection, and dwell activation.

pub mod interaction;
pub mod ipc;
mod runtime;
mod scene;
mod state;
mod timing;

use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "orrery-viewer", about = "Gesture-driven solar-system viewer")]
struct Cli {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/orrery-ipc.sock)
    #[arg(long)]
    ipc_socket: Option<String>,

    /// Log all IPC messages to stderr
    #[arg(long)]
    ipc_trace: bool,

    /// Frame tick rate in Hz
    #[arg(long, default_value_t = 60)]
    tick_hz: u32,

    /// Exit after N seconds (testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Overlay viewport as WxH pixels
    #[arg(long, default_value = "1280x720")]
    viewport: String,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("orrery-viewer {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orrery_viewer=info".into()),
        )
        .init();

    info!("orrery-viewer v{} starting", env!("CARGO_PKG_VERSION"));

    let mut viewport = scene::Viewport::default();
    match scene::Viewport::parse_resolution(&cli.viewport) {
        Some((w, h)) => {
            viewport.width = w;
            viewport.height = h;
        }
        None => {
            eprintln!("Invalid viewport: {}. Use WxH, e.g. 1280x720", cli.viewport);
            std::process::exit(1);
        }
    }

    runtime::run(runtime::RuntimeConfig {
        ipc_socket: cli.ipc_socket.map(std::path::PathBuf::from),
        ipc_trace: cli.ipc_trace,
        tick_hz: cli.tick_hz,
        exit_after: cli.exit_after,
        viewport,
    })
}
