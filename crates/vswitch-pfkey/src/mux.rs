//! Seam toward the external PF_KEY message multiplexer.

use thiserror::Error;
use vswitch_types::VrfIndex;

/// Error returned by a multiplexer while relaying a message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MuxError {
    message: String,
}

impl MuxError {
    pub fn new(message: impl Into<String>) -> Self {
        MuxError {
            message: message.into(),
        }
    }
}

/// Per-connection PF_KEY message multiplexer, scoped to one VRF.
///
/// A multiplexer lives exactly as long as its connection; dropping it
/// releases the underlying resources.
pub trait MsgMux: Send {
    /// Relays one complete PF_KEY message.
    fn relay(&mut self, msg: &[u8]) -> Result<(), MuxError>;
}

/// Creates a multiplexer for each accepted connection.
pub trait MsgMuxFactory: Send + Sync {
    fn mux_for_vrf(&self, index: VrfIndex) -> Box<dyn MsgMux>;
}
