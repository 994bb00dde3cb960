use kdlink_wire::payload::{CoreSwitchResult, PausedDetails, ProcessSwitchResult};

use crate::event::{AutoResetEvent, Mailbox};

/// The fixed set of wakeups the operator thread can park on, one named
/// slot per inbound event kind.
///
/// The original kept these in a flat array of OS events keyed by an
/// integer enum; named fields preserve the one-shot mailbox semantics
/// without the index arithmetic. Created at connection bring-up,
/// released at teardown.
#[derive(Default)]
pub struct RendezvousTable {
    pub started: AutoResetEvent,
    pub paused_details: Mailbox<PausedDetails>,
    pub core_switch: Mailbox<CoreSwitchResult>,
    pub process_switch: Mailbox<ProcessSwitchResult>,
    pub script_running: AutoResetEvent,
    pub script_formats: AutoResetEvent,
    pub finished_command: AutoResetEvent,
    /// The idle wait: parked while the remote system executes,
    /// released by a break or by teardown.
    pub debugger_running: AutoResetEvent,
}

impl RendezvousTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes every parked waiter with no payload. They observe the
    /// closed session, or an empty mailbox, and bail out.
    pub fn release_all(&self) {
        self.started.signal();
        self.paused_details.release();
        self.core_switch.release();
        self.process_switch.release();
        self.script_running.signal();
        self.script_formats.signal();
        self.finished_command.signal();
        self.debugger_running.signal();
    }
}
