use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use kdlink_wire::{
    PacketAction, PacketType,
    payload::{
        ChangeCore, ChangeProcess, OPERATION_SUCCESS, PausedDetails, ScriptRequest, StepKind,
        StepRequest, TextPayload,
    },
};
use tracing::debug;

use crate::{
    KdError,
    lifecycle::{Shared, close_connection},
};

/// Which process a switch targets: query the one currently scheduled,
/// or move to a new pid.
#[derive(Clone, Copy, Debug)]
pub enum ProcessSelection {
    Query,
    Set(u32),
}

/// Synchronous command surface the operator console drives.
///
/// One request in flight at a time: every operation sends its packet
/// and parks on the matching rendezvous before returning. The
/// rendezvous primitives latch a pending signal, so a reply that
/// arrives before the wait is installed is not lost. All operations
/// fail fast with [`KdError::ConnectionClosed`] once teardown has
/// begun.
#[derive(Clone)]
pub struct CommandCoordinator {
    shared: Arc<Shared>,
    pause_in_flight: Arc<AtomicBool>,
}

impl CommandCoordinator {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared, pause_in_flight: Arc::new(AtomicBool::new(false)) }
    }

    fn ensure_open(&self) -> Result<(), KdError> {
        if self.shared.session.is_closed() {
            return Err(KdError::ConnectionClosed);
        }
        Ok(())
    }

    /// Lets the debuggee resume. No reply; the operator thread should
    /// park in [`Self::wait_while_running`] afterwards.
    pub fn continue_execution(&self) -> Result<(), KdError> {
        self.ensure_open()?;
        self.shared.session.clear_core();
        self.shared.sender.send_cmd(PacketType::VmxRoot, PacketAction::Continue)?;
        self.shared.session.mark_running();
        Ok(())
    }

    /// Halts the debuggee and returns its pause details. Valid only
    /// while it runs.
    pub fn pause(&self) -> Result<PausedDetails, KdError> {
        self.ensure_open()?;
        if !self.shared.session.is_running() {
            return Err(KdError::NoChange);
        }
        self.shared.sender.send_cmd(PacketType::UserMode, PacketAction::Pause)?;
        self.await_pause_details()
    }

    /// Single-steps the halted debuggee; the step kind rides in the
    /// payload.
    pub fn step(&self, kind: StepKind) -> Result<PausedDetails, KdError> {
        self.ensure_open()?;
        let mut payload = Vec::new();
        StepRequest { kind }.encode_into(&mut payload);
        self.shared
            .sender
            .send_cmd_with_payload(PacketType::VmxRoot, PacketAction::Step, &payload)?;
        self.await_pause_details()
    }

    fn await_pause_details(&self) -> Result<PausedDetails, KdError> {
        // The router updates the session before posting, so the
        // returned details and the observable state agree.
        self.shared.rendezvous.paused_details.wait().ok_or(KdError::ConnectionClosed)
    }

    /// Moves inspection to another logical core. Asking for the core
    /// already under inspection sends nothing.
    pub fn switch_core(&self, new_core: u32) -> Result<u32, KdError> {
        self.ensure_open()?;
        if new_core == self.shared.session.current_core() {
            self.shared
                .sink
                .message(&format!("the current operating core is {new_core:x} (not changed)"));
            return Err(KdError::NoChange);
        }

        let mut payload = Vec::new();
        ChangeCore { new_core }.encode_into(&mut payload);
        self.shared
            .sender
            .send_cmd_with_payload(PacketType::VmxRoot, PacketAction::ChangeCore, &payload)?;

        let result =
            self.shared.rendezvous.core_switch.wait().ok_or(KdError::ConnectionClosed)?;
        self.check_result(result.result)?;
        Ok(result.core)
    }

    /// Queries or switches the debuggee's current process; returns the
    /// pid now in effect.
    pub fn switch_process(&self, selection: ProcessSelection) -> Result<u32, KdError> {
        self.ensure_open()?;
        let request = match selection {
            ProcessSelection::Query => ChangeProcess { query_current: true, pid: 0 },
            ProcessSelection::Set(pid) => ChangeProcess { query_current: false, pid },
        };
        let mut payload = Vec::new();
        request.encode_into(&mut payload);
        self.shared
            .sender
            .send_cmd_with_payload(PacketType::VmxRoot, PacketAction::ChangeProcess, &payload)?;

        let result =
            self.shared.rendezvous.process_switch.wait().ok_or(KdError::ConnectionClosed)?;
        self.check_result(result.result)?;
        Ok(result.pid)
    }

    /// Ships a script to the debuggee's engine. With `is_format` the
    /// format results arrive first, then the run result; both are
    /// delivered through the sink by the reader.
    pub fn run_script(&self, script: &[u8], pointer: u32, is_format: bool) -> Result<(), KdError> {
        self.ensure_open()?;
        let mut payload = Vec::new();
        ScriptRequest { pointer, is_format, script }.encode_into(&mut payload);
        self.shared
            .sender
            .send_cmd_with_payload(PacketType::VmxRoot, PacketAction::RunScript, &payload)?;

        if is_format {
            self.shared.rendezvous.script_formats.wait();
            self.ensure_open()?;
        }
        self.shared.rendezvous.script_running.wait();
        self.ensure_open()
    }

    /// Forwards one operator command line to the debuggee and waits
    /// until its execution finished.
    pub fn send_user_input(&self, text: &str) -> Result<(), KdError> {
        self.ensure_open()?;
        let mut payload = Vec::new();
        TextPayload { bytes: text.as_bytes() }.encode_into(&mut payload);
        self.shared
            .sender
            .send_cmd_with_payload(PacketType::VmxRoot, PacketAction::UserInputBuffer, &payload)?;

        self.shared.rendezvous.finished_command.wait();
        self.ensure_open()
    }

    /// Closes the session from the operator side.
    pub fn close(&self) {
        close_connection(&self.shared);
    }

    /// Console-interrupt entry point, called from the break thread.
    ///
    /// Halts a running debuggee; a break while paused is silently
    /// ignored, and a second break while a pause is already in flight
    /// is coalesced into it.
    pub fn on_break(&self) {
        if self.shared.session.is_closed() || !self.shared.session.is_running() {
            debug!("break ignored, debuggee not running");
            return;
        }
        if self.pause_in_flight.swap(true, Ordering::AcqRel) {
            debug!("break coalesced, pause already in flight");
            return;
        }

        match self.pause() {
            Ok(_) | Err(KdError::ConnectionClosed | KdError::NoChange) => {}
            Err(e) => {
                self.shared.sink.message(&format!("err, unable to pause the debuggee ({e})"));
            }
        }
        self.pause_in_flight.store(false, Ordering::Release);

        // Hand the console back to the operator.
        self.shared.rendezvous.debugger_running.signal();
    }

    /// The idle state: parked while the remote system executes, until
    /// a break or teardown releases it.
    pub fn wait_while_running(&self) {
        self.shared.sink.message("Debuggee is running...");
        self.shared.rendezvous.debugger_running.wait();
    }

    fn check_result(&self, code: u32) -> Result<(), KdError> {
        if code == OPERATION_SUCCESS {
            return Ok(());
        }
        self.shared.sink.message(&format!("err, the debuggee refused the request (code {code:#x})"));
        Err(KdError::Refused { code })
    }
}
