//! Transmit/receive stream slot tables with reuse-after-close.

use crate::error::{Error, Result};

use super::stream::{ReceiveStream, TransmitStream};

pub struct StreamTable {
    pub transmit_streams: Vec<Option<TransmitStream>>,
    pub receive_streams: Vec<Option<ReceiveStream>>,
}

impl StreamTable {
    pub fn new(transmit_stream_count: usize, receive_stream_count: usize) -> StreamTable {
        StreamTable {
            transmit_streams: (0..transmit_stream_count).map(|_| None).collect(),
            receive_streams: (0..receive_stream_count).map(|_| None).collect(),
        }
    }

    pub fn allocate_transmit(&mut self, stream_id: u16, port: u16, acks_enabled: bool) -> Result<usize> {
        if self
            .transmit_streams
            .iter()
            .flatten()
            .any(|s| s.info.stream_id == stream_id)
        {
            return Err(Error::InvalidArg("stream_id already in use".into()));
        }
        let slot = self
            .transmit_streams
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::NoSlot)?;
        self.transmit_streams[slot] = Some(TransmitStream::new(stream_id, port, acks_enabled));
        Ok(slot)
    }

    pub fn find_transmit_slot(&self, stream_id: u16) -> Option<usize> {
        self.transmit_streams
            .iter()
            .position(|s| matches!(s, Some(s) if s.info.stream_id == stream_id))
    }

    pub fn release_transmit(&mut self, slot: usize) {
        self.transmit_streams[slot] = None;
    }

    pub fn allocate_receive(&mut self, stream_id: u16, port: u16, acks_enabled: bool) -> Result<usize> {
        let slot = self
            .receive_streams
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::NoSlot)?;
        self.receive_streams[slot] = Some(ReceiveStream::new(stream_id, port, acks_enabled));
        Ok(slot)
    }

    pub fn find_receive_slot(&self, stream_id: u16) -> Option<usize> {
        self.receive_streams
            .iter()
            .position(|s| matches!(s, Some(s) if s.info.stream_id == stream_id))
    }

    pub fn release_receive(&mut self, slot: usize) {
        self.receive_streams[slot] = None;
    }
}
