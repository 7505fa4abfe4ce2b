//! Stream lifecycle orchestration: open/write/close, ACK_REQUEST /
//! ACK_RESPONSE, retransmission, the end-of-stream handshake, inactivity
//! timeout, and duplicate suppression.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::comm::transceiver::Transceiver;
use crate::error::{Error, Result};
use crate::event_bus::EventBus;

use super::config::CommProtocolConfig;
use super::packet::{
    Packet, PacketType, FLAG_ACKS_ENABLED, FLAG_ACK_REQUEST_PENDING, FLAG_END_OF_STREAM,
    FLAG_RETRANSMIT, FLAG_START_OF_STREAM, MAX_PAYLOAD_LENGTH,
};
use super::table::StreamTable;

/// Either a cumulative acknowledgement or an explicit list of missing
/// sequence numbers, whichever encodes smaller for the current gap set.
#[derive(Debug, Clone)]
pub enum AckEncoding {
    Cumulative(u32),
    Missing(Vec<u32>),
}

impl AckEncoding {
    fn serialize(&self) -> Vec<u8> {
        match self {
            AckEncoding::Cumulative(seq) => {
                let mut buf = vec![0u8];
                buf.extend_from_slice(&seq.to_le_bytes());
                buf
            }
            AckEncoding::Missing(seqs) => {
                let mut buf = vec![1u8];
                for seq in seqs {
                    buf.extend_from_slice(&seq.to_le_bytes());
                }
                buf
            }
        }
    }

    fn parse(buf: &[u8]) -> Option<AckEncoding> {
        if buf.is_empty() {
            return None;
        }
        match buf[0] {
            0 if buf.len() >= 5 => Some(AckEncoding::Cumulative(u32::from_le_bytes([
                buf[1], buf[2], buf[3], buf[4],
            ]))),
            1 => {
                let seqs = buf[1..]
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Some(AckEncoding::Missing(seqs))
            }
            _ => None,
        }
    }
}

/// A caller-visible reference to an open transmit stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamHandle {
    pub stream_id: u16,
}

struct Inner {
    table: Mutex<StreamTable>,
    next_stream_id: AtomicU16,
}

/// Orchestrates all transmit and receive streams over a shared transceiver.
pub struct ProtocolEngine {
    transceiver: Arc<Transceiver>,
    event_bus: Arc<EventBus>,
    config: Mutex<CommProtocolConfig>,
    inner: Inner,
    running: Arc<AtomicBool>,
    receive_worker: Mutex<Option<JoinHandle<()>>>,
    timer_worker: Mutex<Option<JoinHandle<()>>>,
    crc_error_count: AtomicU64,
}

impl ProtocolEngine {
    pub fn new(
        transceiver: Arc<Transceiver>,
        config: CommProtocolConfig,
        event_bus: Arc<EventBus>,
    ) -> Arc<ProtocolEngine> {
        let engine = Arc::new(ProtocolEngine {
            transceiver,
            event_bus,
            inner: Inner {
                table: Mutex::new(StreamTable::new(
                    config.transmit_stream_count,
                    config.receive_stream_count,
                )),
                next_stream_id: AtomicU16::new(1),
            },
            config: Mutex::new(config),
            running: Arc::new(AtomicBool::new(true)),
            receive_worker: Mutex::new(None),
            timer_worker: Mutex::new(None),
            crc_error_count: AtomicU64::new(0),
        });

        engine.start_receive_worker();
        engine.start_timer_worker();
        engine
    }

    pub fn configure(&self, config: CommProtocolConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.receive_worker.lock().unwrap().take() {
            let _ = h.join();
        }
        if let Some(h) = self.timer_worker.lock().unwrap().take() {
            let _ = h.join();
        }
    }

    pub fn open_transmit_stream(&self, port: u16, acks_enabled: bool) -> Result<StreamHandle> {
        let stream_id = self.inner.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let mut table = self.inner.table.lock().unwrap();
        table.allocate_transmit(stream_id, port, acks_enabled)?;
        Ok(StreamHandle { stream_id })
    }

    /// Chunks `bytes` into DATA packets and enqueues them for transmission.
    pub fn write(&self, handle: StreamHandle, bytes: &[u8]) -> Result<()> {
        let config = *self.config.lock().unwrap();
        let mut table = self.inner.table.lock().unwrap();
        let slot = table
            .find_transmit_slot(handle.stream_id)
            .ok_or(Error::InvalidArg("unknown stream".into()))?;
        let stream = table.transmit_streams[slot].as_mut().unwrap();
        if stream.info.failed {
            return Err(Error::StreamFailed);
        }

        let total_chunks = bytes.chunks(MAX_PAYLOAD_LENGTH).count().max(1);
        for (i, chunk) in bytes.chunks(MAX_PAYLOAD_LENGTH).enumerate() {
            let sequence_number = stream.info.current_sequence_number;
            let mut flags = 0u8;
            if !stream.info.start_of_stream {
                flags |= FLAG_START_OF_STREAM;
            }
            if stream.info.acks_enabled {
                flags |= FLAG_ACKS_ENABLED;
            }

            let packet = Packet {
                packet_type: PacketType::Data,
                flags,
                stream_id: handle.stream_id,
                port: stream.info.port,
                sequence_number,
                acknowledged_sequence_number: stream.info.last_acknowledged_sequence_number,
                payload: chunk.to_vec(),
            };
            let wire = packet.serialize()?;
            self.transceiver.transmit(wire.clone())?;
            stream.info.start_of_stream = true;
            stream.record_sent(sequence_number, wire, chunk.len());

            let is_last_chunk = i == total_chunks - 1;
            let packets_since_ack =
                stream.info.current_sequence_number - stream.info.last_acknowledged_sequence_number;
            if stream.info.acks_enabled
                && is_last_chunk
                && packets_since_ack >= config.stream_acknowledgement_interval_packet_count
            {
                self.send_ack_request(&self.transceiver, stream, handle.stream_id)?;
            }
        }
        Ok(())
    }

    fn send_ack_request(
        &self,
        transceiver: &Arc<Transceiver>,
        stream: &mut super::stream::TransmitStream,
        stream_id: u16,
    ) -> Result<()> {
        let packet = Packet {
            packet_type: PacketType::AckRequest,
            flags: FLAG_ACK_REQUEST_PENDING,
            stream_id,
            port: stream.info.port,
            sequence_number: stream.info.current_sequence_number,
            acknowledged_sequence_number: stream.info.last_acknowledged_sequence_number,
            payload: Vec::new(),
        };
        transceiver.transmit(packet.serialize()?)?;
        stream.info.ack_request_pending = true;
        stream.ack_deadline = Some(Instant::now());
        Ok(())
    }

    /// Emits END_OF_STREAM and marks the stream as awaiting its ACK.
    pub fn close(&self, handle: StreamHandle) -> Result<()> {
        let mut table = self.inner.table.lock().unwrap();
        let slot = table
            .find_transmit_slot(handle.stream_id)
            .ok_or(Error::InvalidArg("unknown stream".into()))?;
        let stream = table.transmit_streams[slot].as_mut().unwrap();

        let packet = Packet {
            packet_type: PacketType::EndOfStream,
            flags: FLAG_END_OF_STREAM,
            stream_id: handle.stream_id,
            port: stream.info.port,
            sequence_number: stream.info.current_sequence_number,
            acknowledged_sequence_number: stream.info.last_acknowledged_sequence_number,
            payload: Vec::new(),
        };
        self.transceiver.transmit(packet.serialize()?)?;
        stream.info.end_of_stream_pending = true;
        stream.info.close_pending = true;
        stream.ack_deadline = Some(Instant::now());
        Ok(())
    }

    /// Packets dropped at this layer for a header or payload CRC mismatch.
    /// Distinct from the radio driver's own `invalid_received_packet_count`,
    /// which counts chip-detected CRC errors one layer down.
    pub fn invalid_received_packet_count(&self) -> u64 {
        self.crc_error_count.load(Ordering::Relaxed)
    }

    pub fn snapshot_all(&self) -> Vec<super::stream::StreamInfo> {
        let table = self.inner.table.lock().unwrap();
        table
            .transmit_streams
            .iter()
            .flatten()
            .map(|s| s.info.clone())
            .chain(table.receive_streams.iter().flatten().map(|s| s.info.clone()))
            .collect()
    }

    fn start_receive_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.receive_loop());
        *self.receive_worker.lock().unwrap() = Some(handle);
    }

    fn receive_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let frame = match self.transceiver.try_receive(Duration::from_millis(200)) {
                Some(f) => f,
                None => continue,
            };
            let packet = match Packet::parse(&frame.payload) {
                Ok(p) => p,
                Err(Error::Crc) => {
                    self.crc_error_count.fetch_add(1, Ordering::Relaxed);
                    debug!("dropping packet with CRC error");
                    continue;
                }
                Err(e) => {
                    warn!("dropping malformed frame: {}", e);
                    continue;
                }
            };
            self.handle_incoming(packet);
        }
    }

    fn handle_incoming(&self, packet: Packet) {
        let config = *self.config.lock().unwrap();
        match packet.packet_type {
            PacketType::Data => self.handle_data(packet, &config),
            PacketType::AckRequest => self.handle_ack_request(packet),
            PacketType::AckResponse => self.handle_ack_response(packet),
            PacketType::EndOfStream => self.handle_end_of_stream(packet),
            PacketType::EndOfStreamAck => self.handle_end_of_stream_ack(packet),
        }
    }

    fn handle_data(&self, packet: Packet, config: &CommProtocolConfig) {
        let mut table = self.inner.table.lock().unwrap();
        let slot = match table.find_receive_slot(packet.stream_id) {
            Some(slot) => slot,
            None => {
                if packet.has_flag(FLAG_START_OF_STREAM) || config.passive_mode {
                    match table.allocate_receive(
                        packet.stream_id,
                        packet.port,
                        packet.has_flag(FLAG_ACKS_ENABLED),
                    ) {
                        Ok(slot) => slot,
                        Err(_) => {
                            warn!("no free receive slot for stream {}", packet.stream_id);
                            return;
                        }
                    }
                } else {
                    return;
                }
            }
        };

        let stream = table.receive_streams[slot].as_mut().unwrap();
        stream.last_activity = Instant::now();
        stream.info.start_of_stream = true;

        if packet.sequence_number < stream.expected_next {
            stream.info.duplicate_transferred_packet_count += 1;
            return;
        }
        if packet.sequence_number > stream.expected_next {
            stream.info.received_packet_sequence_number_error_count += 1;

            let at_capacity = !stream.pending.contains_key(&packet.sequence_number)
                && stream.pending.len() >= config.receive_buffer_length_packets;
            if at_capacity {
                stream.info.failed = true;
                warn!(
                    "stream {} failed: out-of-order buffer exceeded capacity",
                    stream.info.stream_id
                );
                table.release_receive(slot);
                return;
            }

            stream.pending.insert(packet.sequence_number, packet.payload.clone());
            return;
        }

        let mut delivered = Vec::new();
        delivered.push((stream.info.port, stream.info.stream_id, packet.payload));
        stream.expected_next += 1;
        while let Some(data) = stream.pending.remove(&stream.expected_next) {
            delivered.push((stream.info.port, stream.info.stream_id, data));
            stream.expected_next += 1;
        }

        stream.info.current_sequence_number = stream.expected_next;
        stream.info.last_transferred_sequence_number = stream.expected_next.saturating_sub(1);
        stream.info.transferred_packet_count += delivered.len() as u64;

        drop(table);
        for (port, stream_id, data) in delivered {
            self.event_bus.publish(port, stream_id, &data);
        }
    }

    fn handle_ack_request(&self, packet: Packet) {
        let mut table = self.inner.table.lock().unwrap();
        let slot = match table.find_receive_slot(packet.stream_id) {
            Some(s) => s,
            None => return,
        };
        let stream = table.receive_streams[slot].as_mut().unwrap();

        let missing = missing_sequence_numbers(stream.expected_next, &stream.pending);
        let encoding = if missing.is_empty() {
            AckEncoding::Cumulative(stream.expected_next.saturating_sub(1))
        } else {
            AckEncoding::Missing(missing)
        };

        let response = Packet {
            packet_type: PacketType::AckResponse,
            flags: 0,
            stream_id: packet.stream_id,
            port: stream.info.port,
            sequence_number: 0,
            acknowledged_sequence_number: stream.expected_next.saturating_sub(1),
            payload: encoding.serialize(),
        };
        drop(table);
        if let Ok(wire) = response.serialize() {
            let _ = self.transceiver.transmit(wire);
        }
    }

    fn handle_ack_response(&self, packet: Packet) {
        let mut table = self.inner.table.lock().unwrap();
        let slot = match table.find_transmit_slot(packet.stream_id) {
            Some(s) => s,
            None => return,
        };
        let stream = table.transmit_streams[slot].as_mut().unwrap();
        stream.info.ack_request_pending = false;
        stream.ack_deadline = None;
        stream.info.ack_rerequest_count = 0;

        match AckEncoding::parse(&packet.payload) {
            Some(AckEncoding::Cumulative(seq)) => {
                stream.info.last_acknowledged_sequence_number = seq;
                stream.window.retain(|p| p.sequence_number > seq);
            }
            Some(AckEncoding::Missing(missing)) => {
                let mut retransmitted_packets = 0u64;
                let mut retransmitted_bytes = 0u64;
                let wires: Vec<Vec<u8>> = stream
                    .window
                    .iter()
                    .filter(|p| missing.contains(&p.sequence_number))
                    .map(|p| p.wire.clone())
                    .collect();
                for wire in &wires {
                    retransmitted_packets += 1;
                    retransmitted_bytes += wire.len() as u64;
                }
                stream.info.retransmitted_packet_count += retransmitted_packets;
                stream.info.retransmitted_data_bytes += retransmitted_bytes;
                if let Some(&min_missing) = missing.iter().min() {
                    stream.info.last_acknowledged_sequence_number = min_missing.saturating_sub(1);
                }
                drop(table);
                for mut wire in wires {
                    if let Some(byte) = wire.get_mut(1) {
                        *byte |= FLAG_RETRANSMIT;
                    }
                    let _ = self.transceiver.transmit(wire);
                }
                return;
            }
            None => {}
        }
    }

    fn handle_end_of_stream(&self, packet: Packet) {
        let mut table = self.inner.table.lock().unwrap();
        let slot = match table.find_receive_slot(packet.stream_id) {
            Some(s) => s,
            None => return,
        };
        let port = table.receive_streams[slot].as_ref().unwrap().info.port;
        table.release_receive(slot);

        let ack = Packet {
            packet_type: PacketType::EndOfStreamAck,
            flags: 0,
            stream_id: packet.stream_id,
            port,
            sequence_number: 0,
            acknowledged_sequence_number: 0,
            payload: Vec::new(),
        };
        drop(table);
        if let Ok(wire) = ack.serialize() {
            let _ = self.transceiver.transmit(wire);
        }
    }

    fn handle_end_of_stream_ack(&self, packet: Packet) {
        let mut table = self.inner.table.lock().unwrap();
        if let Some(slot) = table.find_transmit_slot(packet.stream_id) {
            table.release_transmit(slot);
        }
    }

    fn start_timer_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.timer_loop());
        *self.timer_worker.lock().unwrap() = Some(handle);
    }

    fn timer_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
            self.check_transmit_deadlines();
            self.check_receive_inactivity();
        }
    }

    fn check_transmit_deadlines(&self) {
        let config = *self.config.lock().unwrap();
        let mut table = self.inner.table.lock().unwrap();
        let mut to_release = Vec::new();
        let mut to_resend: Vec<Vec<u8>> = Vec::new();

        for (slot, maybe_stream) in table.transmit_streams.iter_mut().enumerate() {
            let stream = match maybe_stream {
                Some(s) => s,
                None => continue,
            };
            // The end-of-stream-ack deadline gets a guard interval on top of the
            // base timeout, giving the receiver's END_OF_STREAM_ACK time to get on
            // the air before this side concludes it was lost and re-requests.
            let timeout_millis = if stream.info.close_pending {
                config.stream_acknowledgement_receive_timeout_millis
                    + config.stream_acknowledgement_guard_interval_millis
            } else {
                config.stream_acknowledgement_receive_timeout_millis
            };
            let deadline_elapsed = stream
                .ack_deadline
                .map_or(false, |d| d.elapsed() > Duration::from_millis(timeout_millis));
            if !deadline_elapsed {
                continue;
            }

            if stream.info.close_pending {
                stream.info.end_of_stream_ack_rerequest_count += 1;
                if stream.info.end_of_stream_ack_rerequest_count
                    > config.stream_end_of_stream_acknowledgement_max_rerequest_count
                {
                    stream.info.failed = true;
                    to_release.push(slot);
                } else {
                    stream.ack_deadline = Some(Instant::now());
                    let packet = Packet {
                        packet_type: PacketType::EndOfStream,
                        flags: FLAG_END_OF_STREAM,
                        stream_id: stream.info.stream_id,
                        port: stream.info.port,
                        sequence_number: stream.info.current_sequence_number,
                        acknowledged_sequence_number: stream.info.last_acknowledged_sequence_number,
                        payload: Vec::new(),
                    };
                    if let Ok(wire) = packet.serialize() {
                        to_resend.push(wire);
                    }
                }
            } else if stream.info.ack_request_pending {
                stream.info.ack_rerequest_count += 1;
                if stream.info.ack_rerequest_count > config.stream_acknowledgement_max_rerequest_count {
                    stream.info.failed = true;
                    if !config.ignore_errors {
                        warn!("stream {} failed: ack re-request budget exhausted", stream.info.stream_id);
                    }
                } else {
                    stream.ack_deadline = Some(Instant::now());
                    let packet = Packet {
                        packet_type: PacketType::AckRequest,
                        flags: FLAG_ACK_REQUEST_PENDING,
                        stream_id: stream.info.stream_id,
                        port: stream.info.port,
                        sequence_number: stream.info.current_sequence_number,
                        acknowledged_sequence_number: stream.info.last_acknowledged_sequence_number,
                        payload: Vec::new(),
                    };
                    if let Ok(wire) = packet.serialize() {
                        to_resend.push(wire);
                    }
                }
            }
        }

        for slot in to_release {
            table.release_transmit(slot);
        }
        drop(table);
        for wire in to_resend {
            let _ = self.transceiver.transmit(wire);
        }
    }

    fn check_receive_inactivity(&self) {
        let config = *self.config.lock().unwrap();
        let mut table = self.inner.table.lock().unwrap();
        let mut to_release = Vec::new();
        for (slot, maybe_stream) in table.receive_streams.iter_mut().enumerate() {
            let stream = match maybe_stream {
                Some(s) => s,
                None => continue,
            };
            if stream.last_activity.elapsed() > Duration::from_millis(config.stream_inactivity_timeout_millis) {
                stream.info.failed = true;
                to_release.push(slot);
            }
        }
        for slot in to_release {
            table.release_receive(slot);
        }
    }
}

/// Sequence numbers in `[expected_next, highest_seen]` not present in
/// `pending` (out-of-order arrivals) are the ones the sender needs to
/// retransmit. No buffered out-of-order packets means no gap.
fn missing_sequence_numbers(expected_next: u32, pending: &std::collections::BTreeMap<u32, Vec<u8>>) -> Vec<u32> {
    match pending.keys().next_back().copied() {
        Some(highest_seen) => (expected_next..=highest_seen)
            .filter(|seq| !pending.contains_key(seq))
            .collect(),
        None => Vec::new(),
    }
}
