//! Transmit and receive stream state.

use std::collections::VecDeque;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Transmit,
    Receive,
}

/// Plain snapshot of a stream's observable state, matching the field names
/// and order of the protocol's JSON status artifact field-for-field.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_type: StreamType,
    pub stream_id: u16,
    pub port: u16,
    pub acks_enabled: bool,
    pub acks: bool,
    pub ack_request_pending: bool,
    pub start_of_stream: bool,
    pub end_of_stream_pending: bool,
    pub end_of_stream: bool,
    pub close_pending: bool,
    pub failed: bool,
    pub current_sequence_number: u32,
    pub last_acknowledged_sequence_number: u32,
    pub last_transferred_sequence_number: u32,
    pub transferred_packet_count: u64,
    pub transferred_data_bytes: u64,
    pub transferred_payload_data_bytes: u64,
    pub duplicate_transferred_packet_count: u64,
    pub last_transferred_packet_timestamp: Option<SystemTime>,
    pub ack_rerequest_count: u32,
    pub end_of_stream_ack_rerequest_count: u32,
    pub retransmitted_packet_count: u64,
    pub retransmitted_data_bytes: u64,
    pub retransmitted_payload_data_bytes: u64,
    pub received_packet_sequence_number_error_count: u64,
}

impl StreamInfo {
    fn new(stream_type: StreamType, stream_id: u16, port: u16, acks_enabled: bool) -> StreamInfo {
        StreamInfo {
            stream_type,
            stream_id,
            port,
            acks_enabled,
            acks: false,
            ack_request_pending: false,
            start_of_stream: false,
            end_of_stream_pending: false,
            end_of_stream: false,
            close_pending: false,
            failed: false,
            current_sequence_number: 0,
            last_acknowledged_sequence_number: 0,
            last_transferred_sequence_number: 0,
            transferred_packet_count: 0,
            transferred_data_bytes: 0,
            transferred_payload_data_bytes: 0,
            duplicate_transferred_packet_count: 0,
            last_transferred_packet_timestamp: None,
            ack_rerequest_count: 0,
            end_of_stream_ack_rerequest_count: 0,
            retransmitted_packet_count: 0,
            retransmitted_data_bytes: 0,
            retransmitted_payload_data_bytes: 0,
            received_packet_sequence_number_error_count: 0,
        }
    }
}

/// A sent packet kept around for possible retransmission, plus its wire form.
#[derive(Debug, Clone)]
pub(crate) struct SentPacket {
    pub sequence_number: u32,
    pub wire: Vec<u8>,
}

pub struct TransmitStream {
    pub info: StreamInfo,
    pub(crate) window: VecDeque<SentPacket>,
    pub(crate) ack_deadline: Option<std::time::Instant>,
}

impl TransmitStream {
    pub fn new(stream_id: u16, port: u16, acks_enabled: bool) -> TransmitStream {
        TransmitStream {
            info: StreamInfo::new(StreamType::Transmit, stream_id, port, acks_enabled),
            window: VecDeque::new(),
            ack_deadline: None,
        }
    }

    pub fn record_sent(&mut self, sequence_number: u32, wire: Vec<u8>, payload_len: usize) {
        self.info.current_sequence_number = sequence_number + 1;
        self.info.last_transferred_sequence_number = sequence_number;
        self.info.transferred_packet_count += 1;
        self.info.transferred_data_bytes += wire.len() as u64;
        self.info.transferred_payload_data_bytes += payload_len as u64;
        self.info.last_transferred_packet_timestamp = Some(SystemTime::now());
        self.window.push_back(SentPacket { sequence_number, wire });
    }
}

pub struct ReceiveStream {
    pub info: StreamInfo,
    pub(crate) expected_next: u32,
    /// Out-of-order payloads buffered ahead of `expected_next`, capped by the
    /// engine at `receive_buffer_length_packets` entries.
    pub(crate) pending: std::collections::BTreeMap<u32, Vec<u8>>,
    pub(crate) last_activity: std::time::Instant,
}

impl ReceiveStream {
    pub fn new(stream_id: u16, port: u16, acks_enabled: bool) -> ReceiveStream {
        ReceiveStream {
            info: StreamInfo::new(StreamType::Receive, stream_id, port, acks_enabled),
            expected_next: 0,
            pending: std::collections::BTreeMap::new(),
            last_activity: std::time::Instant::now(),
        }
    }
}

