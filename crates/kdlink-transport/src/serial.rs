//! Device open and configure helpers for the two link flavors.

use std::{
    fs::{File, OpenOptions},
    io,
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt, unix::net::UnixStream},
    path::Path,
};

use tracing::debug;

/// Opens and configures a physical serial port.
///
/// Line parameters are fixed at 8N1 raw mode; only the baud rate is
/// caller selected. Both queues are purged so a new session never sees
/// bytes left over from the previous one. Read timeouts are not used;
/// frame boundaries come from the end-of-buffer sentinel, not the line
/// discipline.
pub fn open_serial(path: &Path, baud: u32) -> io::Result<File> {
    let speed = baud_constant(baud)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)?;
    let fd = file.as_raw_fd();

    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag &= !(libc::CSTOPB | libc::PARENB);
        tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        // Block until at least one byte, no interbyte timeout.
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcflush(fd, libc::TCIOFLUSH) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    debug!(?path, baud, "serial device configured");
    Ok(file)
}

/// Connects to the byte-stream bridge a virtual machine monitor
/// exposes in place of a physical port. No line-discipline step; all
/// other transport semantics are identical to serial.
pub fn connect_pipe(path: &Path) -> io::Result<UnixStream> {
    let stream = UnixStream::connect(path)?;
    debug!(?path, "pipe bridge connected");
    Ok(stream)
}

fn baud_constant(baud: u32) -> io::Result<libc::speed_t> {
    Ok(match baud {
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {baud}"),
            ));
        }
    })
}
