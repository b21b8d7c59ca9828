//! IPC subsystem — s-expression protocol over a Unix socket.
//!
//! `server` owns the listener and per-client framing; `dispatch` parses
//! messages and routes them to the viewer state.

pub mod dispatch;
pub mod server;

pub use server::IpcServer;
