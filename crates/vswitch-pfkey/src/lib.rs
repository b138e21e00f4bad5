//! Per-VRF PF_KEY transport.
//!
//! One [`PfKeyHandler`] per VRF listens on a local socket whose path is
//! derived from the VRF name, accepts connections from the external
//! key-management daemon, and relays PF_KEY protocol messages to a
//! per-connection [message multiplexer](MsgMux) scoped to the VRF's
//! index. Message contents are opaque here; only the base-header length
//! is interpreted, to recover message boundaries on the stream socket.
//!
//! The accept loop and every connection handler run as tracked tasks:
//! [`PfKeyHandler::stop`] cancels them cooperatively and returns only
//! after full quiescence.

mod conns;
mod framing;
mod handler;
mod mux;

pub use framing::{BASE_HEADER_LEN, PFKEY_WORD};
pub use handler::{PfKeyConfig, PfKeyHandler};
pub use mux::{MsgMux, MsgMuxFactory, MuxError};
