use std::{sync::Arc, thread::JoinHandle};

use kdlink_wire::{
    PacketAction, PacketType,
    payload::{CoreSwitchResult, PausedDetails, ProcessSwitchResult, TextPayload},
};
use tracing::{debug, warn};

use crate::{
    channel::{PacketReceiver, RawPacket},
    lifecycle::{Shared, close_connection},
};

/// Background reader on the debugger side.
///
/// Sole reader of the transport: demultiplexes inbound packets into
/// the rendezvous table until the link dies or the debuggee asks to
/// close. Droppable frames (bad indicator, unknown action, short
/// payload) are logged and skipped; the sentinel framing resyncs on
/// its own.
pub(crate) struct EventRouter {
    rx: PacketReceiver,
    shared: Arc<Shared>,
}

impl EventRouter {
    pub(crate) fn spawn(rx: PacketReceiver, shared: Arc<Shared>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("kd-router".into())
            .spawn(move || Self { rx, shared }.run())
            .expect("couldn't spawn the link reader thread")
    }

    fn run(mut self) {
        loop {
            match self.rx.recv_packet() {
                Ok(packet) => {
                    if !self.dispatch(&packet) {
                        break;
                    }
                }
                Err(e) if e.is_droppable() => warn!(%e, "dropping malformed frame"),
                Err(e) => {
                    if !self.shared.session.is_closed() {
                        self.shared
                            .sink
                            .message(&format!("err, connection to the debuggee lost ({e})"));
                    }
                    debug!(%e, "reader loop terminating");
                    close_connection(&self.shared);
                    break;
                }
            }
        }
    }

    /// False when the loop should exit.
    fn dispatch(&self, packet: &RawPacket) -> bool {
        let r = &self.shared.rendezvous;
        match (packet.header.typ, packet.header.action) {
            (_, PacketAction::CloseAndUnload) => {
                debug!("debuggee requested close");
                close_connection(&self.shared);
                return false;
            }
            (PacketType::DebuggeeEvent, PacketAction::Started) => r.started.signal(),
            (PacketType::DebuggeeEvent, PacketAction::PausedDetails) => {
                match PausedDetails::parse(&packet.payload) {
                    Ok(details) => {
                        self.shared.session.mark_paused(details.core);
                        r.paused_details.post(details);
                    }
                    Err(e) => warn!(%e, "dropping malformed pause details"),
                }
            }
            (PacketType::DebuggeeEvent, PacketAction::CoreSwitchResult) => {
                match CoreSwitchResult::parse(&packet.payload) {
                    Ok(result) => r.core_switch.post(result),
                    Err(e) => warn!(%e, "dropping malformed core switch result"),
                }
            }
            (PacketType::DebuggeeEvent, PacketAction::ProcessSwitchResult) => {
                match ProcessSwitchResult::parse(&packet.payload) {
                    Ok(result) => r.process_switch.post(result),
                    Err(e) => warn!(%e, "dropping malformed process switch result"),
                }
            }
            (PacketType::DebuggeeEvent, PacketAction::ScriptFormatResult) => {
                self.deliver_text(&packet.payload);
                r.script_formats.signal();
            }
            (PacketType::DebuggeeEvent, PacketAction::ScriptResult) => {
                self.deliver_text(&packet.payload);
                r.script_running.signal();
            }
            (PacketType::DebuggeeEvent, PacketAction::FinishedCommand) => {
                r.finished_command.signal();
            }
            (PacketType::DebuggeeEvent, PacketAction::UsermodePrint) => {
                self.deliver_text(&packet.payload);
            }
            (typ, action) => warn!(?typ, ?action, "dropping unexpected packet"),
        }
        true
    }

    fn deliver_text(&self, payload: &[u8]) {
        match TextPayload::parse(payload) {
            Ok(text) => self.shared.sink.message(&String::from_utf8_lossy(text.bytes)),
            Err(e) => warn!(%e, "dropping malformed text payload"),
        }
    }
}
