use kdlink_transport::TransportError;
use kdlink_wire::{FrameError, WireError};
use thiserror::Error;

/// Session-level failure taxonomy.
///
/// Transport and framing variants are fatal and drive teardown.
/// `NoChange` and `Refused` are protocol-level refusals the session
/// survives; they are reported to the operator and the operation
/// returns failure. `Timeout` is reserved: every wait today is
/// unbounded.
#[derive(Error, Debug)]
pub enum KdError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("operation timed out")]
    Timeout,
    #[error("target unchanged")]
    NoChange,
    #[error("debuggee refused the request (code {code:#x})")]
    Refused { code: u32 },
    #[error("kernel helper ioctl failed (code {code:#x})")]
    IoctlFailed { code: u32 },
    #[error("kernel helper modules are not loaded")]
    DriverNotLoaded,
    #[error("already connected to a debugger or debuggee")]
    AlreadyConnected,
    #[error("transport kind is not valid for this role")]
    InvalidTransportKind,
    #[error("connection is closed")]
    ConnectionClosed,
}

impl KdError {
    /// Whether the reader loop may drop the offending frame and keep
    /// going. Everything except a wire-level parse failure tears the
    /// session down.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::Wire(_))
    }
}
