//! Action-defined payload records.
//!
//! Control records are fixed little-endian layouts; variable-length
//! records carry a `len` prefix followed by exactly `len` raw bytes.
//! Parsers take the payload slice a frame decoder produced and ignore
//! any trailing bytes, mirroring how the peer consumes struct
//! prefixes.

use strum::FromRepr;

use crate::packet::WireError;

/// Result code meaning the debuggee accepted and performed a request.
/// Anything else is a protocol-level refusal, reported to the operator
/// without tearing the session down.
pub const OPERATION_SUCCESS: u32 = 0;

fn u32_at(bytes: &[u8], at: usize) -> Result<u32, WireError> {
    bytes
        .get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or(WireError::Truncated { needed: at + 4, got: bytes.len() })
}

fn u64_at(bytes: &[u8], at: usize) -> Result<u64, WireError> {
    bytes
        .get(at..at + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or(WireError::Truncated { needed: at + 8, got: bytes.len() })
}

#[derive(FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StepKind {
    In = 1,
    Out = 2,
}

/// Why the debuggee stopped.
#[derive(FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PauseReason {
    Break = 1,
    Step = 2,
    Breakpoint = 3,
}

/// `Step` request. The step kind rides in the payload so the debuggee
/// does not have to guess between step-in and step-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRequest {
    pub kind: StepKind,
}

impl StepRequest {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.kind as u32).to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let kind = u32_at(bytes, 0)?;
        let kind = StepKind::from_repr(kind).ok_or(WireError::BadValue(kind))?;
        Ok(Self { kind })
    }
}

/// `ChangeCore` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeCore {
    pub new_core: u32,
}

impl ChangeCore {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.new_core.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(Self { new_core: u32_at(bytes, 0)? })
    }
}

/// `ChangeProcess` request: either query the current process id or
/// switch to a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeProcess {
    pub query_current: bool,
    pub pid: u32,
}

impl ChangeProcess {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&u32::from(self.query_current).to_le_bytes());
        buf.extend_from_slice(&self.pid.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(Self { query_current: u32_at(bytes, 0)? != 0, pid: u32_at(bytes, 4)? })
    }
}

/// `CoreSwitchResult` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreSwitchResult {
    pub result: u32,
    pub core: u32,
}

impl CoreSwitchResult {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.result.to_le_bytes());
        buf.extend_from_slice(&self.core.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(Self { result: u32_at(bytes, 0)?, core: u32_at(bytes, 4)? })
    }
}

/// `ProcessSwitchResult` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessSwitchResult {
    pub result: u32,
    pub pid: u32,
}

impl ProcessSwitchResult {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.result.to_le_bytes());
        buf.extend_from_slice(&self.pid.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(Self { result: u32_at(bytes, 0)?, pid: u32_at(bytes, 4)? })
    }
}

/// `PausedDetails` event: which core stopped, why, and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PausedDetails {
    pub core: u32,
    pub reason: PauseReason,
    pub rip: u64,
}

impl PausedDetails {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.core.to_le_bytes());
        buf.extend_from_slice(&(self.reason as u32).to_le_bytes());
        buf.extend_from_slice(&self.rip.to_le_bytes());
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let core = u32_at(bytes, 0)?;
        let reason = u32_at(bytes, 4)?;
        let reason = PauseReason::from_repr(reason).ok_or(WireError::BadValue(reason))?;
        Ok(Self { core, reason, rip: u64_at(bytes, 8)? })
    }
}

/// `RunScript` request: fixed prefix, then the raw script bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptRequest<'a> {
    pub pointer: u32,
    pub is_format: bool,
    pub script: &'a [u8],
}

impl<'a> ScriptRequest<'a> {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.script.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.pointer.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.is_format).to_le_bytes());
        buf.extend_from_slice(self.script);
    }

    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let len = u32_at(bytes, 0)? as usize;
        let pointer = u32_at(bytes, 4)?;
        let is_format = u32_at(bytes, 8)? != 0;
        let script = bytes
            .get(12..12 + len)
            .ok_or(WireError::Truncated { needed: 12 + len, got: bytes.len() })?;
        Ok(Self { pointer, is_format, script })
    }
}

/// Length-prefixed raw text, used by user input, user-mode prints and
/// script output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextPayload<'a> {
    pub bytes: &'a [u8],
}

impl<'a> TextPayload<'a> {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.bytes);
    }

    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let len = u32_at(bytes, 0)? as usize;
        let bytes = bytes
            .get(4..4 + len)
            .ok_or(WireError::Truncated { needed: 4 + len, got: bytes.len() })?;
        Ok(Self { bytes })
    }
}
