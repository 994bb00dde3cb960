//! Transport core of a two-machine hypervisor debugger.
//!
//! Two hosts, the operator console (debugger) and the target under
//! debug (debuggee), talk across a point-to-point byte stream: a
//! physical serial port, or the named-pipe bridge a virtual machine
//! monitor exposes in its place. This crate implements the framing of
//! command and event packets over that stream, the half-duplex
//! request/response state machine between the interactive operator and
//! the asynchronous events produced by the debuggee's kernel, and the
//! lifecycle of the connection around them.
//!
//! The command parser, the operator console, and the local kernel
//! helper are external collaborators with narrow contracts
//! ([`Interpreter`], [`MessageSink`], [`DriverChannel`]).

pub mod channel;
mod coordinator;
mod debuggee;
mod driver;
mod error;
pub mod event;
mod lifecycle;
mod rendezvous;
mod router;
mod session;
mod sink;

pub use kdlink_transport as transport;
pub use kdlink_wire as wire;

pub use coordinator::{CommandCoordinator, ProcessSelection};
pub use debuggee::{Debuggee, DebuggeeConfig, Interpreter, handle_user_input, send_usermode_prints};
pub use driver::{DriverChannel, OS_NAME_LEN, PrepareDebuggeeRequest};
pub use error::KdError;
pub use lifecycle::{Debugger, TransportLink};
pub use rendezvous::RendezvousTable;
pub use session::{LinkKind, NO_CORE, Role, SessionState};
pub use sink::MessageSink;
