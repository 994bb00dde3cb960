//! Typed packets over sentinel-delimited frames.

use std::sync::Mutex;

use kdlink_transport::ByteTransport;
use kdlink_wire::{
    FrameDecoder, FrameError, HEADER_LEN, MAX_FRAME, PacketAction, PacketHeader, PacketType,
    SENTINEL, terminate,
};

use crate::KdError;

/// Writing half of the link.
///
/// The internal mutex serializes senders: two frames submitted
/// concurrently land on the wire one after the other, never
/// interleaved. A frame is always staged as one
/// `header || payload || sentinel` buffer and written in a single
/// call, so the peer can never observe a frame without its
/// terminator.
pub struct PacketSender {
    transport: Mutex<Box<dyn ByteTransport>>,
}

impl PacketSender {
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self { transport: Mutex::new(transport) }
    }

    /// Header-only command frame.
    pub fn send_cmd(&self, typ: PacketType, action: PacketAction) -> Result<(), KdError> {
        self.send(typ, action, &[])
    }

    /// Command frame with an action-defined payload, observed by the
    /// peer's decoder as a single `header || payload` frame.
    pub fn send_cmd_with_payload(
        &self,
        typ: PacketType,
        action: PacketAction,
        payload: &[u8],
    ) -> Result<(), KdError> {
        self.send(typ, action, payload)
    }

    fn send(&self, typ: PacketType, action: PacketAction, payload: &[u8]) -> Result<(), KdError> {
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + SENTINEL.len());
        PacketHeader::new(typ, action).encode_into(&mut buf);
        buf.extend_from_slice(payload);
        terminate(&mut buf);
        if buf.len() > MAX_FRAME {
            return Err(FrameError::Oversized.into());
        }

        let mut transport = self.transport.lock().unwrap();
        transport.write_all(&buf)?;
        Ok(())
    }
}

/// One decoded frame, header split off.
#[derive(Debug)]
pub struct RawPacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

/// Reading half of the link: reassembles frames byte by byte. Single
/// owner; only the reader loop holds one.
pub struct PacketReceiver {
    transport: Box<dyn ByteTransport>,
    decoder: FrameDecoder,
}

impl PacketReceiver {
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self { transport, decoder: FrameDecoder::new() }
    }

    /// Blocks until one full frame arrives. Wire-level parse failures
    /// are droppable ([`KdError::is_droppable`]); transport and
    /// framing failures are fatal.
    pub fn recv_packet(&mut self) -> Result<RawPacket, KdError> {
        loop {
            let byte = self.transport.read_byte()?;
            if let Some(frame) = self.decoder.push(byte)? {
                let (header, payload) = PacketHeader::split(&frame)?;
                return Ok(RawPacket { header, payload: payload.to_vec() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        sync::{Arc, Mutex},
    };

    use kdlink_transport::{Blocking, TransportError};
    use kdlink_wire::{SENTINEL, WireError};

    use super::*;

    /// Loopback transport: writes append to a shared buffer, reads
    /// drain it.
    #[derive(Clone, Default)]
    struct MemPipe(Arc<Mutex<Vec<u8>>>);

    impl Read for MemPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut data = self.0.lock().unwrap();
            if data.is_empty() {
                return Ok(0);
            }
            let n = buf.len().min(data.len());
            buf[..n].copy_from_slice(&data[..n]);
            data.drain(..n);
            Ok(n)
        }
    }

    impl Write for MemPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn command_frame_lands_terminated() {
        let pipe = MemPipe::default();
        let sender = PacketSender::new(Box::new(Blocking::new(pipe.clone())));
        sender.send_cmd(PacketType::VmxRoot, PacketAction::Continue).unwrap();

        let wire = pipe.0.lock().unwrap().clone();
        assert_eq!(wire.len(), HEADER_LEN + SENTINEL.len());
        assert_eq!(&wire[wire.len() - 4..], &SENTINEL[..]);
    }

    #[test]
    fn sent_packet_is_received_intact() {
        let pipe = MemPipe::default();
        let sender = PacketSender::new(Box::new(Blocking::new(pipe.clone())));
        sender
            .send_cmd_with_payload(PacketType::UserMode, PacketAction::Pause, &[9, 8, 7])
            .unwrap();

        let mut receiver = PacketReceiver::new(Box::new(Blocking::new(pipe)));
        let packet = receiver.recv_packet().unwrap();
        assert_eq!(packet.header.typ, PacketType::UserMode);
        assert_eq!(packet.header.action, PacketAction::Pause);
        assert_eq!(packet.payload, vec![9, 8, 7]);
    }

    #[test]
    fn oversized_payload_is_refused_before_the_wire() {
        let pipe = MemPipe::default();
        let sender = PacketSender::new(Box::new(Blocking::new(pipe.clone())));
        let err = sender
            .send_cmd_with_payload(
                PacketType::VmxRoot,
                PacketAction::RunScript,
                &vec![0u8; kdlink_wire::MAX_FRAME],
            )
            .unwrap_err();
        assert!(matches!(err, KdError::Frame(_)));
        assert!(pipe.0.lock().unwrap().is_empty());
    }

    #[test]
    fn bad_indicator_is_droppable_and_the_stream_resyncs() {
        let pipe = MemPipe::default();
        {
            let mut raw = pipe.clone();
            // A garbage frame, then a valid one.
            raw.write_all(&kdlink_wire::encode(&[0xAB; 16])).unwrap();
        }
        let sender = PacketSender::new(Box::new(Blocking::new(pipe.clone())));
        sender.send_cmd(PacketType::VmxRoot, PacketAction::Continue).unwrap();

        let mut receiver = PacketReceiver::new(Box::new(Blocking::new(pipe)));
        let err = receiver.recv_packet().unwrap_err();
        assert!(err.is_droppable());
        assert!(matches!(err, KdError::Wire(WireError::IndicatorMismatch(_))));

        let packet = receiver.recv_packet().unwrap();
        assert_eq!(packet.header.action, PacketAction::Continue);
    }

    #[test]
    fn drained_pipe_reports_broken_transport() {
        let pipe = MemPipe::default();
        let mut receiver = PacketReceiver::new(Box::new(Blocking::new(pipe)));
        let err = receiver.recv_packet().unwrap_err();
        assert!(matches!(err, KdError::Transport(TransportError::Broken(_))));
    }
}
