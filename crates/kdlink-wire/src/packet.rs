use strum::FromRepr;
use thiserror::Error;

/// Magic constant carried by every packet of this protocol.
pub const PACKET_INDICATOR: u32 = 0x4B44_4247;

/// Fixed header size: indicator, type, action, 4 bytes each.
pub const HEADER_LEN: usize = 12;

/// Parse-level failures. All of these are droppable by the reader
/// loop: the offending frame is discarded and the stream resyncs on
/// the next sentinel.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("packet indicator mismatch (got {0:#010x})")]
    IndicatorMismatch(u32),
    #[error("unknown packet type {0:#x}")]
    UnknownType(u32),
    #[error("unknown packet action {0:#x}")]
    UnknownAction(u32),
    #[error("unrecognized field value {0:#x}")]
    BadValue(u32),
    #[error("packet truncated (needed {needed} bytes, got {got})")]
    Truncated { needed: usize, got: usize },
}

/// Which half of the debuggee a packet addresses, or the event plane
/// coming back from it.
#[derive(FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    /// Debuggee kernel, halted in hypervisor root mode.
    VmxRoot = 1,
    /// Debuggee host-OS user-mode helper; the target keeps executing.
    UserMode = 2,
    /// Debuggee-to-debugger events.
    DebuggeeEvent = 3,
}

/// Request and event kinds, a closed enumeration shared with the peer.
#[derive(FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketAction {
    Continue = 1,
    Step = 2,
    ChangeCore = 3,
    ChangeProcess = 4,
    RunScript = 5,
    UserInputBuffer = 6,
    CloseAndUnload = 7,

    Pause = 10,
    DoNotReadAnyPacket = 11,

    Started = 20,
    PausedDetails = 21,
    CoreSwitchResult = 22,
    ProcessSwitchResult = 23,
    ScriptResult = 24,
    ScriptFormatResult = 25,
    FinishedCommand = 26,
    UsermodePrint = 27,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub typ: PacketType,
    pub action: PacketAction,
}

impl PacketHeader {
    pub fn new(typ: PacketType, action: PacketAction) -> Self {
        Self { typ, action }
    }

    /// Little-endian `indicator || type || action`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&PACKET_INDICATOR.to_le_bytes());
        buf.extend_from_slice(&(self.typ as u32).to_le_bytes());
        buf.extend_from_slice(&(self.action as u32).to_le_bytes());
    }

    /// Splits a decoded frame into header and payload.
    pub fn split(frame: &[u8]) -> Result<(Self, &[u8]), WireError> {
        if frame.len() < HEADER_LEN {
            return Err(WireError::Truncated { needed: HEADER_LEN, got: frame.len() });
        }
        let indicator = u32::from_le_bytes(frame[0..4].try_into().unwrap());
        if indicator != PACKET_INDICATOR {
            return Err(WireError::IndicatorMismatch(indicator));
        }
        let typ = u32::from_le_bytes(frame[4..8].try_into().unwrap());
        let typ = PacketType::from_repr(typ).ok_or(WireError::UnknownType(typ))?;
        let action = u32::from_le_bytes(frame[8..12].try_into().unwrap());
        let action = PacketAction::from_repr(action).ok_or(WireError::UnknownAction(action))?;
        Ok((Self { typ, action }, &frame[HEADER_LEN..]))
    }
}
