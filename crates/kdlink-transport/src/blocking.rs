use std::io::{self, Read, Write};

use crate::{ByteTransport, TransportError};

/// Synchronous transport, used on the debuggee side: plain blocking
/// reads and writes on the underlying device.
pub struct Blocking<T> {
    inner: T,
}

impl<T> Blocking<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Read + Write + Send> ByteTransport for Blocking<T> {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(bytes)?;
        self.inner.flush()?;
        Ok(())
    }
}
