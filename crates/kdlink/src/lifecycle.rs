//! Debugger-side bring-up, teardown and the console break handler.

use std::{
    fs::File,
    os::unix::net::UnixStream,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use kdlink_transport::{ByteTransport, CancelHandle, Cancelable, TransportError};
use kdlink_wire::{PacketAction, PacketType};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::{
    KdError, MessageSink,
    channel::{PacketReceiver, PacketSender},
    coordinator::CommandCoordinator,
    rendezvous::RendezvousTable,
    router::EventRouter,
    session::{LinkKind, Role, SessionState},
};

/// The byte channel a connection runs over, opened and configured by
/// the caller (see `kdlink_transport::serial`).
pub enum TransportLink {
    Serial(File),
    NamedPipe(UnixStream),
}

/// Reader half, writer half, and their cancellation handles.
type SplitTransport = (Box<dyn ByteTransport>, Box<dyn ByteTransport>, CancelHandle, CancelHandle);

impl TransportLink {
    pub(crate) fn kind(&self) -> LinkKind {
        match self {
            Self::Serial(_) => LinkKind::Serial,
            Self::NamedPipe(_) => LinkKind::NamedPipe,
        }
    }

    /// Reader and writer halves over the same open device, each with
    /// its own cancellation wakeup.
    fn split_cancelable(self) -> Result<SplitTransport, KdError> {
        fn build<T>(reader: T, writer: T) -> Result<SplitTransport, KdError>
        where
            T: std::io::Read + std::io::Write + std::os::fd::AsRawFd + Send + 'static,
        {
            let reader = Cancelable::new(reader).map_err(TransportError::Broken)?;
            let writer = Cancelable::new(writer).map_err(TransportError::Broken)?;
            let cancels = (reader.cancel_handle(), writer.cancel_handle());
            Ok((Box::new(reader), Box::new(writer), cancels.0, cancels.1))
        }

        match self {
            Self::Serial(device) => {
                let writer = device.try_clone().map_err(TransportError::Broken)?;
                build(device, writer)
            }
            Self::NamedPipe(stream) => {
                let writer = stream.try_clone().map_err(TransportError::Broken)?;
                build(stream, writer)
            }
        }
    }

    /// Consumes the link into a single blocking transport (debuggee
    /// side).
    pub(crate) fn into_blocking(self) -> Box<dyn ByteTransport> {
        match self {
            Self::Serial(device) => Box::new(kdlink_transport::Blocking::new(device)),
            Self::NamedPipe(stream) => Box::new(kdlink_transport::Blocking::new(stream)),
        }
    }
}

/// State shared by the coordinator, the router thread and teardown.
pub(crate) struct Shared {
    pub session: Arc<SessionState>,
    pub rendezvous: RendezvousTable,
    pub sender: PacketSender,
    pub sink: Arc<dyn MessageSink>,
    read_cancel: CancelHandle,
    write_cancel: CancelHandle,
}

/// Idempotent session teardown; never raises. The first caller wins,
/// later calls return immediately.
pub(crate) fn close_connection(shared: &Shared) {
    if !shared.session.begin_close() {
        return;
    }

    if shared.session.role() == Role::Debugger {
        // Ask the debuggee's kernel to unload, then poke its user-mode
        // reader so it is not left parked on the next frame.
        match shared.sender.send_cmd(PacketType::VmxRoot, PacketAction::CloseAndUnload) {
            Ok(()) => {
                shared.sink.message("unloading debugger vmm module on debuggee...");
                if let Err(e) =
                    shared.sender.send_cmd(PacketType::UserMode, PacketAction::DoNotReadAnyPacket)
                {
                    debug!(%e, "debuggee user-mode reader may still be parked");
                }
            }
            Err(e) => debug!(%e, "close packet not delivered"),
        }
    } else {
        // The link died before the start packet: there is a waiter
        // parked on the handshake to release.
        shared
            .sink
            .message("err, start packet not received but the debuggee closed the connection");
    }

    uninitialize(shared);
}

fn uninitialize(shared: &Shared) {
    BREAK_TARGET.lock().unwrap().take();
    shared.read_cancel.cancel();
    shared.write_cancel.cancel();
    shared.rendezvous.release_all();
    shared.session.reset();
    info!("connection uninitialized");
}

/// Where a console break is routed. The process-wide ctrlc handler is
/// installed once and retargeted per connection.
static BREAK_TARGET: Lazy<Mutex<Option<CommandCoordinator>>> = Lazy::new(|| Mutex::new(None));

static BREAK_HANDLER: Lazy<Result<(), ctrlc::Error>> = Lazy::new(|| {
    ctrlc::set_handler(|| {
        let target = BREAK_TARGET.lock().unwrap().clone();
        if let Some(coordinator) = target {
            coordinator.on_break();
        }
    })
});

fn install_break_handler(coordinator: CommandCoordinator) {
    *BREAK_TARGET.lock().unwrap() = Some(coordinator);
    if let Err(e) = &*BREAK_HANDLER {
        warn!(%e, "console break handler unavailable");
    }
}

/// Operator-side connection handle.
///
/// Bring-up: split the device, spawn the reader, wait for the
/// debuggee's start packet, install the break handler. After `connect`
/// returns the debuggee is executing; the operator thread is expected
/// to park in [`CommandCoordinator::wait_while_running`] until the
/// first break.
pub struct Debugger {
    coordinator: CommandCoordinator,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl Debugger {
    pub fn connect(
        link: TransportLink,
        session: Arc<SessionState>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, KdError> {
        if session.role() != Role::Unconnected {
            return Err(KdError::AlreadyConnected);
        }
        let kind = link.kind();
        let (reader, writer, read_cancel, write_cancel) = link.split_cancelable()?;

        session.mark_open();
        let shared = Arc::new(Shared {
            session: session.clone(),
            rendezvous: RendezvousTable::new(),
            sender: PacketSender::new(writer),
            sink,
            read_cancel,
            write_cancel,
        });

        let router = EventRouter::spawn(PacketReceiver::new(reader), shared.clone());

        shared.sink.message("Waiting for debuggee to connect ...");
        shared.rendezvous.started.wait();

        if shared.session.is_closed() {
            // The link died before the handshake completed; the router
            // already drove teardown.
            let _ = router.join();
            return Err(KdError::ConnectionClosed);
        }

        session.set_role(Role::Debugger);
        session.set_link(kind);
        session.mark_running();
        info!(?kind, "debuggee connected");

        let coordinator = CommandCoordinator::new(shared);
        install_break_handler(coordinator.clone());

        Ok(Self { coordinator, router: Mutex::new(Some(router)) })
    }

    pub fn coordinator(&self) -> &CommandCoordinator {
        &self.coordinator
    }

    /// Sends the close handshake if the session is still up and reaps
    /// the reader thread. Safe to call more than once.
    pub fn close(&self) {
        self.coordinator.close();
        if let Some(handle) = self.router.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.close();
    }
}
