//! IPC server — Unix socket listener, per-client framing, and event
//! broadcast.
//!
//! Frames are a 4-byte big-endian length prefix followed by an
//! s-expression payload.  Clients authenticate with a `hello` handshake
//! before receiving broadcasts; a per-client rate limit bounds how fast a
//! feed may push frames.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::state::ViewerState;

/// Hard cap on a single frame's payload (1 MiB).
const MAX_MESSAGE_SIZE: u32 = 1_048_576;

/// Write buffer level above which new events are dropped (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Default per-client message budget per second.  A 60 Hz gesture feed
/// plus control traffic fits comfortably.
const DEFAULT_RATE_LIMIT: u32 = 200;

// ── Rate limiting ───────────────────────────────────────────

/// Fixed-window message counter.
pub struct RateLimiter {
    window_start: Instant,
    seen: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            seen: 0,
            max_per_second,
        }
    }

    /// Count one message; false means the budget for this window is spent.
    fn admit(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.seen = 1;
            return true;
        }
        self.seen += 1;
        self.seen <= self.max_per_second
    }
}

// ── Clients ─────────────────────────────────────────────────

/// Peer UID via SO_PEERCRED, used to reject other users' connections.
fn peer_uid(stream: &UnixStream) -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        (ret == 0).then_some(cred.uid)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream;
        None
    }
}

/// One connected IPC client.
pub struct IpcClient {
    pub stream: UnixStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    pub authenticated: bool,
    pub id: u64,
    pub peer_uid: Option<u32>,
    pub rate_limiter: RateLimiter,
}

impl IpcClient {
    fn new(stream: UnixStream, id: u64) -> Self {
        stream.set_nonblocking(true).ok();
        let peer_uid = peer_uid(&stream);
        if peer_uid.is_none() {
            warn!(id, "no peer credentials available");
        }
        Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            authenticated: false,
            id,
            peer_uid,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    /// Queue a framed response for sending.
    pub fn enqueue_message(&mut self, payload: &str) {
        self.write_buf
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.write_buf.extend_from_slice(payload.as_bytes());
    }

    /// Queue an event, shedding it under backpressure.
    pub fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer full, dropping event");
            return;
        }
        self.enqueue_message(payload);
    }

    /// Drain the write buffer as far as the socket allows.
    fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pull all complete frames out of the read buffer.
    fn take_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while self.read_buf.len() >= 4 {
            let len = u32::from_be_bytes([
                self.read_buf[0],
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
            ]);
            if len > MAX_MESSAGE_SIZE {
                error!(client_id = self.id, len, "oversized frame, resetting buffer");
                self.read_buf.clear();
                break;
            }
            let total = 4 + len as usize;
            if self.read_buf.len() < total {
                break;
            }
            frames.push(String::from_utf8_lossy(&self.read_buf[4..total]).into_owned());
            self.read_buf.drain(..total);
        }
        frames
    }

    /// Read whatever the socket has ready into the buffer.
    fn fill_read_buf(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::ConnectionReset.into()),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Server ──────────────────────────────────────────────────

/// Listener socket plus all connected clients.
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    pub ipc_trace: bool,
}

impl IpcServer {
    /// Create the server (bind separately once the event loop exists).
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
        }
    }

    /// Compute the default socket path.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/orrery-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("orrery-ipc.sock")
    }

    /// Bind the listener and register the accept source with calloop.
    pub fn bind(
        socket_path: &Path,
        loop_handle: &LoopHandle<'static, ViewerState>,
    ) -> anyhow::Result<()> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(?socket_path, "IPC server listening");

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle.insert_source(source, |_event, listener, state: &mut ViewerState| {
            loop {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        let id = state.ipc_server.next_client_id;
                        state.ipc_server.next_client_id += 1;
                        info!(client_id = id, "IPC client connected");
                        state.ipc_server.clients.insert(id, IpcClient::new(stream, id));
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("accept error: {}", e);
                        break;
                    }
                }
            }
            Ok(PostAction::Continue)
        })?;

        Ok(())
    }

    /// Service every client: read, dispatch, flush.  Called once per
    /// event loop iteration.
    pub fn poll_clients(state: &mut ViewerState) {
        let ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        let mut dead = Vec::new();

        for id in ids {
            match Self::service_client(state, id) {
                Ok(()) => {}
                Err(e) => {
                    debug!(client_id = id, "client dropped: {}", e);
                    dead.push(id);
                }
            }
        }

        for id in dead {
            info!(client_id = id, "removing disconnected IPC client");
            state.ipc_server.clients.remove(&id);
        }
    }

    fn service_client(state: &mut ViewerState, id: u64) -> io::Result<()> {
        let frames = {
            let Some(client) = state.ipc_server.clients.get_mut(&id) else {
                return Ok(());
            };
            client.fill_read_buf()?;
            client.take_frames()
        };

        for raw in frames {
            let admitted = state
                .ipc_server
                .clients
                .get_mut(&id)
                .map(|c| c.rate_limiter.admit())
                .unwrap_or(false);
            if !admitted {
                warn!(client_id = id, "rate limit exceeded, dropping message");
                if let Some(client) = state.ipc_server.clients.get_mut(&id) {
                    client.enqueue_message(
                        "(:type :response :id 0 :status :error :reason \"rate limit exceeded\")",
                    );
                }
                continue;
            }

            if state.ipc_server.ipc_trace {
                info!(client_id = id, "<< {}", raw);
            }
            if let Some(resp) = dispatch::handle_message(state, id, &raw) {
                if state.ipc_server.ipc_trace {
                    info!(client_id = id, ">> {}", resp);
                }
                if let Some(client) = state.ipc_server.clients.get_mut(&id) {
                    client.enqueue_message(&resp);
                }
            }
        }

        match state.ipc_server.clients.get_mut(&id) {
            Some(client) => client.flush_writes(),
            None => Ok(()),
        }
    }

    /// Broadcast an event to all authenticated clients.
    pub fn broadcast_event(state: &mut ViewerState, event: &str) {
        if state.ipc_server.ipc_trace {
            info!("broadcast >> {}", event);
        }
        for client in state.ipc_server.clients.values_mut() {
            if client.authenticated {
                client.enqueue_event(event);
            }
        }
    }
}

// ── Test helpers ────────────────────────────────────────────

#[cfg(test)]
impl IpcServer {
    /// Insert a loopback client (unauthenticated) for dispatch tests.
    pub(crate) fn insert_test_client(&mut self) -> u64 {
        let (a, _b) = UnixStream::pair().expect("socketpair");
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, IpcClient::new(a, id));
        id
    }
}

// ── Tests ───────────────────────────────────────────────────
