mod frame;
mod packet;
pub mod payload;

pub use frame::{FrameDecoder, FrameError, MAX_FRAME, SENTINEL, encode, terminate};
pub use packet::{HEADER_LEN, PACKET_INDICATOR, PacketAction, PacketHeader, PacketType, WireError};
