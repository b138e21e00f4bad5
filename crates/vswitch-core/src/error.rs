//! Error types for control-plane operations.

use thiserror::Error;
use vswitch_types::{EncapsMethod, ParseError, VifIndex};

/// Result type alias for VRF-level operations.
pub type VrfResult<T> = Result<T, VrfError>;

/// Failure reported by a dataplane object (forwarding module, VIF, or
/// the global VIF-index space).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphError {
    message: String,
}

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphError {
            message: message.into(),
        }
    }
}

/// Errors surfaced by VRF-level operations.
#[derive(Debug, Error)]
pub enum VrfError {
    /// The VRF name does not match the required pattern.
    #[error(transparent)]
    InvalidName(#[from] ParseError),

    /// A VRF with this name already exists.
    #[error("VRF {0} already exists")]
    AlreadyExists(String),

    /// Every VRF index slot is occupied.
    #[error("no space left for a new VRF")]
    CapacityExhausted,

    /// The global VIF-index space refused an allocation.
    #[error("can't assign a VIF index: {source}")]
    VifIndexAllocation {
        #[source]
        source: GraphError,
    },

    /// The ICMP/tap module could not be created.
    #[error("ICMP handler instance creation failed: {source}")]
    TapCreation {
        #[source]
        source: GraphError,
    },

    /// The router module could not be created.
    #[error("router instance creation failed: {source}")]
    RouterCreation {
        #[source]
        source: GraphError,
    },

    /// The route distinguisher is already used by a live VRF.
    #[error("route distinguisher {0} already exists")]
    RdInUse(u64),

    /// The VIF is not attached to this VRF.
    #[error("VIF {0} is not attached to this VRF")]
    VifNotAttached(VifIndex),

    /// The interface carries no tunnel configuration.
    #[error("{0} carries no tunnel configuration")]
    NotTunnel(String),

    /// The tunnel has no remote address configured.
    #[error("no remote address configured for the tunnel on {0}")]
    NoRemoteAddress(String),

    /// The encapsulation method is not supported for L2 tunnels.
    #[error("unsupported L2 tunnel encapsulation method: {0}")]
    UnsupportedEncaps(EncapsMethod),

    /// Only a VRF may be registered as an output device through the
    /// route/PBR path.
    #[error("output device {0} is not a VRF")]
    NotAVrf(VifIndex),

    /// A connect/disconnect call to a forwarding module failed; the
    /// in-progress operation was rolled back.
    #[error("graph wiring failed: {0}")]
    Wiring(#[from] GraphError),

    /// A wiring failure on a path with no rollback. Indicates a graph
    /// construction defect; callers must treat it as fatal.
    #[error("unrecoverable graph wiring failure: {0}")]
    FatalWiring(#[source] GraphError),

    /// The operation is not implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}
