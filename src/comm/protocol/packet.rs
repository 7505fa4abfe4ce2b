//! Packet header framing: type/flags/stream/sequence/CRC.

use crc::{Crc, CRC_16_IBM_3740};

use crate::error::{Error, Result};

/// CRC-16/CCITT-FALSE, applied identically to the header and payload regions.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub const HEADER_LENGTH: usize = 20;
pub const MAX_FRAME_LENGTH: usize = 255;
pub const MAX_PAYLOAD_LENGTH: usize = MAX_FRAME_LENGTH - HEADER_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    AckRequest = 1,
    AckResponse = 2,
    EndOfStream = 3,
    EndOfStreamAck = 4,
}

impl PacketType {
    fn from_u8(v: u8) -> Result<PacketType> {
        match v {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::AckRequest),
            2 => Ok(PacketType::AckResponse),
            3 => Ok(PacketType::EndOfStream),
            4 => Ok(PacketType::EndOfStreamAck),
            _ => Err(Error::InvalidArg("unknown packet type".into())),
        }
    }
}

pub const FLAG_START_OF_STREAM: u8 = 0x01;
pub const FLAG_END_OF_STREAM: u8 = 0x02;
pub const FLAG_ACKS_ENABLED: u8 = 0x04;
pub const FLAG_ACK_REQUEST_PENDING: u8 = 0x08;
pub const FLAG_RETRANSMIT: u8 = 0x10;

#[derive(Debug, Clone)]
pub struct Packet {
    pub packet_type: PacketType,
    pub flags: u8,
    pub stream_id: u16,
    pub port: u16,
    pub sequence_number: u32,
    pub acknowledged_sequence_number: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Serializes header + payload, computing both CRCs.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(Error::InvalidArg("payload exceeds max length".into()));
        }

        let mut buf = Vec::with_capacity(HEADER_LENGTH + self.payload.len());
        buf.push(self.packet_type as u8);
        buf.push(self.flags);
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.extend_from_slice(&self.sequence_number.to_le_bytes());
        buf.extend_from_slice(&self.acknowledged_sequence_number.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());

        let header_crc = CRC16.checksum(&buf);
        buf.extend_from_slice(&header_crc.to_le_bytes());

        let payload_crc = CRC16.checksum(&self.payload);
        buf.extend_from_slice(&payload_crc.to_le_bytes());

        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parses and CRC-validates a frame off the wire.
    pub fn parse(buf: &[u8]) -> Result<Packet> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::InvalidArg("frame shorter than header".into()));
        }

        let header_crc = u16::from_le_bytes([buf[16], buf[17]]);
        if CRC16.checksum(&buf[0..16]) != header_crc {
            return Err(Error::Crc);
        }

        let payload_length = u16::from_le_bytes([buf[14], buf[15]]) as usize;
        if buf.len() != HEADER_LENGTH + payload_length {
            return Err(Error::InvalidArg("frame length does not match header".into()));
        }

        let payload_crc = u16::from_le_bytes([buf[18], buf[19]]);
        let payload = buf[HEADER_LENGTH..].to_vec();
        if CRC16.checksum(&payload) != payload_crc {
            return Err(Error::Crc);
        }

        Ok(Packet {
            packet_type: PacketType::from_u8(buf[0])?,
            flags: buf[1],
            stream_id: u16::from_le_bytes([buf[2], buf[3]]),
            port: u16::from_le_bytes([buf[4], buf[5]]),
            sequence_number: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            acknowledged_sequence_number: u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Packet {
        Packet {
            packet_type: PacketType::Data,
            flags: FLAG_START_OF_STREAM | FLAG_ACKS_ENABLED,
            stream_id: 1,
            port: 100,
            sequence_number: 0,
            acknowledged_sequence_number: 0,
            payload: vec![0x41],
        }
    }

    #[test]
    fn round_trips() {
        let packet = sample_packet();
        let wire = packet.serialize().unwrap();
        let parsed = Packet::parse(&wire).unwrap();
        assert_eq!(parsed.stream_id, packet.stream_id);
        assert_eq!(parsed.port, packet.port);
        assert_eq!(parsed.payload, packet.payload);
        assert_eq!(parsed.flags, packet.flags);
    }

    #[test]
    fn on_wire_length_is_header_plus_payload() {
        let packet = sample_packet();
        let wire = packet.serialize().unwrap();
        assert_eq!(wire.len(), HEADER_LENGTH + packet.payload.len());
    }

    #[test]
    fn corrupted_header_crc_is_rejected() {
        let packet = sample_packet();
        let mut wire = packet.serialize().unwrap();
        wire[0] ^= 0xFF;
        assert!(matches!(Packet::parse(&wire), Err(Error::Crc)));
    }

    #[test]
    fn corrupted_payload_crc_is_rejected() {
        let packet = sample_packet();
        let mut wire = packet.serialize().unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(Packet::parse(&wire), Err(Error::Crc)));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut packet = sample_packet();
        packet.payload = vec![0u8; MAX_PAYLOAD_LENGTH + 1];
        assert!(packet.serialize().is_err());
    }

    #[test]
    fn max_payload_fits_single_frame() {
        let mut packet = sample_packet();
        packet.payload = vec![0xAB; MAX_PAYLOAD_LENGTH];
        let wire = packet.serialize().unwrap();
        assert_eq!(wire.len(), MAX_FRAME_LENGTH);
        Packet::parse(&wire).unwrap();
    }
}
