mod blocking;
mod cancelable;
mod error;
pub mod serial;

pub use blocking::Blocking;
pub use cancelable::{CancelHandle, Cancelable};
pub use error::TransportError;

/// A reliable ordered byte channel with blocking semantics.
///
/// Both operations block until completion or failure. Implementations
/// are one-owner: the connection layer clones the underlying device
/// handle and builds one transport per direction, so the reader thread
/// and the (serialized) writers never contend on a transport instance.
pub trait ByteTransport: Send {
    fn read_byte(&mut self) -> Result<u8, TransportError>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}
