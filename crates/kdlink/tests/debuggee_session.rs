//! Debuggee-side serve loop tests against a scripted debugger.

use std::{
    fs::File,
    io::Write,
    os::{fd::OwnedFd, unix::net::UnixStream},
    sync::{Arc, Mutex},
    thread,
};

use kdlink::{
    Debuggee, DebuggeeConfig, DriverChannel, Interpreter, KdError, MessageSink,
    PrepareDebuggeeRequest, Role, SessionState, TransportLink,
};
use kdlink_wire::{PacketAction, PacketHeader, PacketType, payload::TextPayload, terminate};

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);

impl MessageSink for RecordingSink {
    fn message(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

#[derive(Default)]
struct StubDriver {
    calls: Mutex<Vec<String>>,
    prepare_result: Mutex<u32>,
}

impl StubDriver {
    fn with_prepare_result(code: u32) -> Self {
        Self { calls: Mutex::new(Vec::new()), prepare_result: Mutex::new(code) }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl DriverChannel for StubDriver {
    fn load(&self) -> Result<(), KdError> {
        self.calls.lock().unwrap().push("load".into());
        Ok(())
    }

    fn unload(&self) -> Result<(), KdError> {
        self.calls.lock().unwrap().push("unload".into());
        Ok(())
    }

    fn prepare_debuggee(&self, req: &PrepareDebuggeeRequest) -> Result<u32, KdError> {
        self.calls.lock().unwrap().push(format!("prepare port={:#x} baud={}", req.port, req.baud));
        Ok(*self.prepare_result.lock().unwrap())
    }

    fn send_command_finished(&self) -> Result<(), KdError> {
        self.calls.lock().unwrap().push("finished".into());
        Ok(())
    }

    fn send_usermode_messages(&self, bytes: &[u8]) -> Result<(), KdError> {
        self.calls.lock().unwrap().push(format!("print {}", String::from_utf8_lossy(bytes)));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingInterpreter(Mutex<Vec<String>>);

impl RecordingInterpreter {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Interpreter for RecordingInterpreter {
    fn execute(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

/// The serve loop wants the serial flavor; a socket pair stands in for
/// the device.
fn serial_pair() -> (TransportLink, UnixStream) {
    let (device, remote) = UnixStream::pair().unwrap();
    (TransportLink::Serial(File::from(OwnedFd::from(device))), remote)
}

fn send_cmd(stream: &mut UnixStream, typ: PacketType, action: PacketAction, payload: &[u8]) {
    let mut frame = Vec::new();
    PacketHeader::new(typ, action).encode_into(&mut frame);
    frame.extend_from_slice(payload);
    terminate(&mut frame);
    stream.write_all(&frame).unwrap();
}

#[test]
fn serve_prepares_pumps_and_unloads() {
    let (link, mut debugger) = serial_pair();
    let driver = Arc::new(StubDriver::default());
    let interpreter = Arc::new(RecordingInterpreter::default());
    let sink = Arc::new(RecordingSink::default());
    let session = Arc::new(SessionState::new());

    let serve = {
        let (driver, interpreter, sink, session) =
            (driver.clone(), interpreter.clone(), sink.clone(), session.clone());
        thread::spawn(move || {
            let config = DebuggeeConfig::new(0x2F8, 115_200).with_os_description("TestOS 1.0");
            Debuggee::serve(link, &config, driver, interpreter, sink, session)
        })
    };

    // A pause request from the debugger lands in the local REPL.
    send_cmd(&mut debugger, PacketType::UserMode, PacketAction::Pause, &[]);

    // A forwarded command line executes and completion is signalled.
    let mut input = Vec::new();
    TextPayload { bytes: b"lm" }.encode_into(&mut input);
    send_cmd(&mut debugger, PacketType::VmxRoot, PacketAction::UserInputBuffer, &input);

    // Close handshake: stop reading, serve returns.
    send_cmd(&mut debugger, PacketType::UserMode, PacketAction::DoNotReadAnyPacket, &[]);

    serve.join().unwrap().unwrap();

    assert_eq!(interpreter.lines(), vec!["pause", "lm"]);
    let calls = driver.calls();
    assert_eq!(calls[0], "load");
    assert!(calls.contains(&"prepare port=0x2f8 baud=115200".to_string()));
    assert!(calls.contains(&"finished".to_string()));
    assert_eq!(calls.last().unwrap(), "unload");
    assert_eq!(session.role(), Role::Unconnected);
    assert!(session.is_closed());
}

#[test]
fn rejected_prepare_fails_bringup_and_unloads() {
    let (link, _debugger) = serial_pair();
    let driver = Arc::new(StubDriver::with_prepare_result(0x30));
    let session = Arc::new(SessionState::new());

    let err = Debuggee::serve(
        link,
        &DebuggeeConfig::new(0x3F8, 9600),
        driver.clone(),
        Arc::new(RecordingInterpreter::default()),
        Arc::new(RecordingSink::default()),
        session.clone(),
    )
    .unwrap_err();

    assert!(matches!(err, KdError::IoctlFailed { code: 0x30 }));
    assert_eq!(driver.calls().last().unwrap(), "unload");
    assert!(!session.modules_loaded());
}

#[test]
fn named_pipe_is_not_a_debuggee_transport() {
    let (a, _b) = UnixStream::pair().unwrap();
    let err = Debuggee::serve(
        TransportLink::NamedPipe(a),
        &DebuggeeConfig::new(0x3F8, 9600),
        Arc::new(StubDriver::default()),
        Arc::new(RecordingInterpreter::default()),
        Arc::new(RecordingSink::default()),
        Arc::new(SessionState::new()),
    )
    .unwrap_err();
    assert!(matches!(err, KdError::InvalidTransportKind));
}

#[test]
fn debugger_hangup_releases_the_serve_loop() {
    let (link, debugger) = serial_pair();
    let driver = Arc::new(StubDriver::default());
    let session = Arc::new(SessionState::new());

    let serve = {
        let (driver, session) = (driver.clone(), session.clone());
        thread::spawn(move || {
            Debuggee::serve(
                link,
                &DebuggeeConfig::new(0x2F8, 115_200),
                driver,
                Arc::new(RecordingInterpreter::default()),
                Arc::new(RecordingSink::default()),
                session,
            )
        })
    };

    drop(debugger);
    serve.join().unwrap().unwrap();

    assert_eq!(driver.calls().last().unwrap(), "unload");
    assert!(session.is_closed());
}
