use std::{
    io::{self, Read, Write},
    os::fd::{AsRawFd, RawFd},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mio::{Events, Interest, Poll, Token, Waker, unix::SourceFd};
use tracing::debug;

use crate::{ByteTransport, TransportError};

const DEVICE: Token = Token(0);
const CANCEL: Token = Token(1);

/// Interruptible transport, used on the debugger side.
///
/// The descriptor is switched to nonblocking mode and parked in a
/// private poll whenever it runs dry. [`CancelHandle::cancel`] wakes
/// the poll from any thread; the pending call, and every call after
/// it, returns [`TransportError::Cancelled`] without consuming bytes
/// beyond those already returned. One instance per direction over a
/// cloned device handle gives the reader and the writer independent
/// wakeups.
pub struct Cancelable<T: AsRawFd> {
    inner: T,
    poll: Poll,
    events: Events,
    cancelled: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

/// Cloneable cancellation side of a [`Cancelable`] transport.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl CancelHandle {
    /// Abandons the transport. Terminal: there is no un-cancel.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // A failed wake only matters if a thread is parked; it will
        // observe the flag on its next readiness event anyway.
        if let Err(e) = self.waker.wake() {
            debug!(%e, "cancel wakeup not delivered");
        }
    }
}

impl<T: AsRawFd> Cancelable<T> {
    pub fn new(inner: T) -> io::Result<Self> {
        set_nonblocking(inner.as_raw_fd())?;
        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&inner.as_raw_fd()),
            DEVICE,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        let waker = Arc::new(Waker::new(poll.registry(), CANCEL)?);
        Ok(Self {
            inner,
            poll,
            events: Events::with_capacity(4),
            cancelled: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { cancelled: self.cancelled.clone(), waker: self.waker.clone() }
    }

    /// Parks until the device reports readiness or the transport is
    /// cancelled. Callers retry their syscall afterwards; readiness is
    /// edge-driven, so the syscall must have returned `WouldBlock`
    /// before parking.
    fn park(&mut self) -> Result<(), TransportError> {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }
            if self.events.iter().any(|e| e.token() == DEVICE) {
                return Ok(());
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), TransportError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(TransportError::Cancelled);
        }
        Ok(())
    }
}

impl<T: Read + Write + AsRawFd + Send> ByteTransport for Cancelable<T> {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        loop {
            self.check_cancelled()?;
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.park()?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), TransportError> {
        while !bytes.is_empty() {
            self.check_cancelled()?;
            match self.inner.write(bytes) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.park()?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
