use tracing::warn;

use crate::KdError;

/// Fixed capacity of the OS description field in the prepare request.
pub const OS_NAME_LEN: usize = 256;

/// Input record of the `PrepareDebuggee` ioctl: which port the kernel
/// helper should drive, at what rate, and how the host OS describes
/// itself.
pub struct PrepareDebuggeeRequest {
    pub port: u32,
    pub baud: u32,
    pub os_name: [u8; OS_NAME_LEN],
}

impl PrepareDebuggeeRequest {
    /// Builds the request with a zero-initialized name buffer. A
    /// missing OS description is surfaced as a warning and the buffer
    /// stays all-zero; it is never sent uninitialized.
    pub fn new(port: u32, baud: u32, os_description: Option<&str>) -> Self {
        let mut os_name = [0u8; OS_NAME_LEN];
        match os_description {
            Some(desc) => {
                let len = desc.len().min(OS_NAME_LEN - 1);
                os_name[..len].copy_from_slice(&desc.as_bytes()[..len]);
            }
            None => warn!("no OS description available, sending a zeroed name"),
        }
        Self { port, baud, os_name }
    }
}

/// Ioctl surface of the local kernel helper, used on the debuggee side
/// only. `load`/`unload` manage the helper's residency; the remaining
/// entry points map one-to-one onto the driver's control codes.
pub trait DriverChannel: Send + Sync {
    fn load(&self) -> Result<(), KdError>;
    fn unload(&self) -> Result<(), KdError>;
    /// Returns the driver's result code; zero is success.
    fn prepare_debuggee(&self, req: &PrepareDebuggeeRequest) -> Result<u32, KdError>;
    fn send_command_finished(&self) -> Result<(), KdError>;
    fn send_usermode_messages(&self, bytes: &[u8]) -> Result<(), KdError>;
}
