//! Target-side half of the link.
//!
//! The user-mode helper prepares the kernel module, then pumps packets
//! off the wire while the target executes: pause requests go to the
//! local command interpreter, forwarded command lines run and signal
//! completion, and the stop marker ends the loop. Anything else on the
//! line belongs to the kernel, which consumes it out of band while the
//! target is halted, and is ignored here.

use std::{sync::Arc, thread};

use kdlink_wire::{PacketAction, payload::{OPERATION_SUCCESS, TextPayload}};
use tracing::{debug, info, warn};

use crate::{
    KdError, MessageSink,
    channel::PacketReceiver,
    driver::{DriverChannel, PrepareDebuggeeRequest},
    event::ManualResetEvent,
    lifecycle::TransportLink,
    session::{LinkKind, Role, SessionState},
};

/// Debuggee-side connection parameters, handed to the kernel helper
/// during bring-up.
#[derive(Clone, Debug)]
pub struct DebuggeeConfig {
    pub port: u32,
    pub baud: u32,
    pub os_description: Option<String>,
}

impl DebuggeeConfig {
    pub fn new(port: u32, baud: u32) -> Self {
        Self { port, baud, os_description: None }
    }

    pub fn with_os_description(mut self, description: impl Into<String>) -> Self {
        self.os_description = Some(description.into());
        self
    }
}

/// Debuggee-side command entry, provided by the console layer.
pub trait Interpreter: Send + Sync {
    fn execute(&self, line: &str);
}

/// Runs one operator command forwarded by the debugger, then signals
/// the kernel that execution finished so the debugger's wait releases.
pub fn handle_user_input(
    driver: &dyn DriverChannel,
    interpreter: &dyn Interpreter,
    input: &str,
) -> Result<(), KdError> {
    interpreter.execute(input);
    driver.send_command_finished()
}

/// Forwards operator-visible output produced on the debuggee to the
/// debugger's console, via the kernel helper.
pub fn send_usermode_prints(driver: &dyn DriverChannel, text: &str) -> Result<(), KdError> {
    driver.send_usermode_messages(text.as_bytes())
}

struct DebuggeeShared {
    session: Arc<SessionState>,
    driver: Arc<dyn DriverChannel>,
    interpreter: Arc<dyn Interpreter>,
    sink: Arc<dyn MessageSink>,
    stop: ManualResetEvent,
}

pub struct Debuggee;

impl Debuggee {
    /// Brings the target side up and blocks until the debugger closes
    /// the session (or the link dies).
    ///
    /// Serial only: the named-pipe bridge lives on the virtualization
    /// host and is never valid here. The kernel helper is loaded and
    /// prepared first; only then does the listener start reading.
    pub fn serve(
        link: TransportLink,
        config: &DebuggeeConfig,
        driver: Arc<dyn DriverChannel>,
        interpreter: Arc<dyn Interpreter>,
        sink: Arc<dyn MessageSink>,
        session: Arc<SessionState>,
    ) -> Result<(), KdError> {
        if session.role() != Role::Unconnected {
            return Err(KdError::AlreadyConnected);
        }
        if matches!(link, TransportLink::NamedPipe(_)) {
            sink.message("err, cannot use a named pipe for the debuggee");
            return Err(KdError::InvalidTransportKind);
        }

        session.mark_open();
        driver.load()?;
        session.set_modules_loaded(true);

        let request =
            PrepareDebuggeeRequest::new(config.port, config.baud, config.os_description.as_deref());
        let code = driver.prepare_debuggee(&request)?;
        if code != OPERATION_SUCCESS {
            if let Err(e) = driver.unload() {
                warn!(%e, "kernel helper left resident after failed bring-up");
            }
            session.set_modules_loaded(false);
            return Err(KdError::IoctlFailed { code });
        }
        sink.message("The operation was successful");

        session.set_role(Role::Debuggee);
        session.set_link(LinkKind::Serial);
        info!(port = config.port, baud = config.baud, "debuggee prepared");

        let receiver = PacketReceiver::new(link.into_blocking());
        let shared = Arc::new(DebuggeeShared {
            session,
            driver,
            interpreter,
            sink,
            stop: ManualResetEvent::new(),
        });

        let listener = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("kd-debuggee-listener".into())
                .spawn(move || listen(receiver, &shared))
                .expect("couldn't spawn the debuggee listener thread")
        };

        // Hold the operator here until the debugger lets go.
        shared.stop.wait();
        let _ = listener.join();
        Ok(())
    }
}

fn listen(mut receiver: PacketReceiver, shared: &DebuggeeShared) {
    loop {
        match receiver.recv_packet() {
            Ok(packet) => match packet.header.action {
                PacketAction::Pause => shared.interpreter.execute("pause"),
                PacketAction::UserInputBuffer => match TextPayload::parse(&packet.payload) {
                    Ok(text) => {
                        let input = String::from_utf8_lossy(text.bytes);
                        if let Err(e) = handle_user_input(
                            shared.driver.as_ref(),
                            shared.interpreter.as_ref(),
                            &input,
                        ) {
                            shared
                                .sink
                                .message(&format!("err, couldn't signal command completion ({e})"));
                        }
                    }
                    Err(e) => warn!(%e, "dropping malformed user input"),
                },
                PacketAction::DoNotReadAnyPacket => {
                    debug!("debugger closed the session");
                    close_local(shared);
                    break;
                }
                action => debug!(?action, "ignoring packet addressed to the kernel"),
            },
            Err(e) if e.is_droppable() => warn!(%e, "dropping malformed frame"),
            Err(e) => {
                if !shared.session.is_closed() {
                    shared.sink.message(&format!("err, connection to the debugger lost ({e})"));
                }
                close_local(shared);
                break;
            }
        }
    }
}

/// Debuggee-side teardown: unload the kernel helper and release the
/// operator. Latched like the debugger-side close.
fn close_local(shared: &DebuggeeShared) {
    if !shared.session.begin_close() {
        return;
    }
    if shared.session.modules_loaded() {
        if let Err(e) = shared.driver.unload() {
            shared.sink.message(&format!("err, failed to unload the kernel helper ({e})"));
        }
        shared.session.set_modules_loaded(false);
    }
    shared.session.reset();
    shared.stop.signal();
}
