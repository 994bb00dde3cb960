use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Device removed, peer closed, or any other I/O failure. Fatal to
    /// the session; the caller escalates to connection teardown.
    #[error("transport broken: {0}")]
    Broken(#[from] io::Error),
    /// A pending read or write was abandoned from another thread. No
    /// bytes beyond those already returned were consumed.
    #[error("transfer cancelled")]
    Cancelled,
}
