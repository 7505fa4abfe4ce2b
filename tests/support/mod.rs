//! An in-memory SX127x-class chip pair, wired SPI/GPIO-down, that lets the
//! real `RadioDriver` state machine run against a loopback "ether" instead
//! of `spidev`/`sysfs_gpio`. No physical chip is available in this
//! environment, so scenario-level tests drive the real transceiver and
//! protocol stack over this pair rather than mocking those layers directly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ert_link::error::Result;
use ert_link::hal::gpio::{Edge, GpioPin};
use ert_link::hal::spi::SpiDevice;
use ert_link::radio::config::{Bandwidth, ErrorCodingRate, RadioConfig};
use ert_link::radio::registers::*;
use ert_link::radio::RadioDriver;
use ert_link::config::{CommProtocolConfig, TransceiverConfig};
use ert_link::{EventBus, ProtocolEngine};
use ert_link::comm::transceiver::Transceiver;

type DropFilter = Box<dyn Fn(&[u8]) -> bool + Send>;

struct ChipState {
    registers: [u8; 128],
    opmode: u8,
    fifo: [u8; 256],
    fifo_ptr: u8,
    irq_flags: u8,
    rx_nb_bytes: u8,
    inbox: VecDeque<Vec<u8>>,
}

impl ChipState {
    fn new() -> ChipState {
        ChipState {
            registers: [0u8; 128],
            opmode: MODE_LORA_SLEEP | MODE_FLAG_LORA,
            fifo: [0u8; 256],
            fifo_ptr: 0,
            irq_flags: 0,
            rx_nb_bytes: 0,
            inbox: VecDeque::new(),
        }
    }
}

/// One simulated chip. Two of these, `link`ed together, stand in for the
/// two ends of an air interface.
pub struct LoopbackChip {
    inner: Mutex<ChipState>,
    dio0_callback: Mutex<Option<Box<dyn Fn() + Send>>>,
    dio5_callback: Mutex<Option<Box<dyn Fn() + Send>>>,
    peer: Mutex<Option<Arc<LoopbackChip>>>,
    drop_filter: Mutex<Option<DropFilter>>,
}

impl LoopbackChip {
    pub fn new() -> Arc<LoopbackChip> {
        Arc::new(LoopbackChip {
            inner: Mutex::new(ChipState::new()),
            dio0_callback: Mutex::new(None),
            dio5_callback: Mutex::new(None),
            peer: Mutex::new(None),
            drop_filter: Mutex::new(None),
        })
    }

    pub fn link(a: &Arc<LoopbackChip>, b: &Arc<LoopbackChip>) {
        *a.peer.lock().unwrap() = Some(Arc::clone(b));
        *b.peer.lock().unwrap() = Some(Arc::clone(a));
    }

    /// Drops a frame this chip is about to put on the air whenever `filter`
    /// returns true for its raw wire bytes, simulating a lossy link.
    pub fn set_drop_filter(self: &Arc<Self>, filter: impl Fn(&[u8]) -> bool + Send + 'static) {
        *self.drop_filter.lock().unwrap() = Some(Box::new(filter));
    }

    fn read_register(&self, reg: u8) -> u8 {
        match reg {
            REG_VERSION => 0x12,
            REG_LORA_MODEM_STATUS => {
                STATUS_SIGNAL_DETECTED | STATUS_SIGNAL_SYNCHRONIZED | STATUS_HEADER_INFO_VALID
            }
            REG_LORA_PACKET_SNR => 40,
            REG_LORA_PACKET_RSSI => 100,
            REG_LORA_FREQ_ERROR_MSB | REG_LORA_FREQ_ERROR_MID | REG_LORA_FREQ_ERROR_LSB => 0,
            REG_LORA_RX_NB_BYTES => self.inner.lock().unwrap().rx_nb_bytes,
            REG_LORA_FIFO_RX_CURRENT_ADDR => 0,
            REG_LORA_IRQ_FLAGS => self.inner.lock().unwrap().irq_flags,
            REG_OPMODE => self.inner.lock().unwrap().opmode,
            _ => self.inner.lock().unwrap().registers[(reg & 0x7F) as usize],
        }
    }

    fn write_register(self: &Arc<Self>, reg: u8, value: u8) {
        match reg {
            REG_OPMODE => self.set_opmode(value),
            REG_LORA_FIFO_ADDR_PTR => self.inner.lock().unwrap().fifo_ptr = value,
            REG_LORA_IRQ_FLAGS => self.inner.lock().unwrap().irq_flags &= !value,
            _ => self.inner.lock().unwrap().registers[(reg & 0x7F) as usize] = value,
        }
    }

    fn fifo_write(&self, data: &[u8]) {
        let mut state = self.inner.lock().unwrap();
        for &byte in data {
            let ptr = state.fifo_ptr;
            state.fifo[ptr as usize] = byte;
            state.fifo_ptr = ptr.wrapping_add(1);
        }
    }

    fn fifo_read(&self, len: usize) -> Vec<u8> {
        let mut state = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let ptr = state.fifo_ptr;
            out.push(state.fifo[ptr as usize]);
            state.fifo_ptr = ptr.wrapping_add(1);
        }
        out
    }

    /// Mirrors the chip's own mode-ready IRQ (DIO5) and, for a transition
    /// into transmit or receive, the autonomous behavior that follows it.
    fn set_opmode(self: &Arc<Self>, value: u8) {
        self.inner.lock().unwrap().opmode = value;

        let masked = value & !MODE_FLAG_LORA;
        let chip = Arc::clone(self);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(2));
            if let Some(cb) = chip.dio5_callback.lock().unwrap().as_ref() {
                cb();
            }
            if masked == MODE_LORA_TX {
                std::thread::sleep(Duration::from_millis(3));
                chip.complete_transmit();
            } else if masked == MODE_LORA_RX_CONTINUOUS || masked == MODE_LORA_RX_SINGLE {
                chip.try_deliver();
            }
        });
    }

    /// Chip-autonomous end of a transmit burst: latch TX_DONE, fall back to
    /// standby, and hand the frame to the linked chip's air interface.
    fn complete_transmit(self: &Arc<Self>) {
        let (frame, peer) = {
            let mut state = self.inner.lock().unwrap();
            let len = state.registers[(REG_LORA_PAYLOAD_LENGTH & 0x7F) as usize] as usize;
            let frame = state.fifo[..len].to_vec();
            state.opmode = MODE_LORA_STANDBY | MODE_FLAG_LORA;
            state.irq_flags |= IRQ_FLAG_TX_DONE;
            (frame, self.peer.lock().unwrap().clone())
        };
        if let Some(cb) = self.dio0_callback.lock().unwrap().as_ref() {
            cb();
        }

        let dropped = self
            .drop_filter
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |f| f(&frame));
        if dropped {
            return;
        }
        if let Some(peer) = peer {
            peer.inner.lock().unwrap().inbox.push_back(frame);
            peer.try_deliver();
        }
    }

    /// Pulls one frame out of the inbox if currently listening, mirroring
    /// the window in which a real chip can latch an over-the-air frame.
    fn try_deliver(self: &Arc<Self>) {
        let delivered = {
            let mut state = self.inner.lock().unwrap();
            let masked = state.opmode & !MODE_FLAG_LORA;
            if masked != MODE_LORA_RX_CONTINUOUS && masked != MODE_LORA_RX_SINGLE {
                return;
            }
            match state.inbox.pop_front() {
                Some(frame) => {
                    let len = frame.len().min(state.fifo.len());
                    state.fifo[..len].copy_from_slice(&frame[..len]);
                    state.rx_nb_bytes = len as u8;
                    state.fifo_ptr = 0;
                    state.irq_flags |= IRQ_FLAG_RX_DONE;
                    if masked == MODE_LORA_RX_SINGLE {
                        state.opmode = MODE_LORA_STANDBY | MODE_FLAG_LORA;
                    }
                    true
                }
                None => false,
            }
        };
        if delivered {
            let chip = Arc::clone(self);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(1));
                if let Some(cb) = chip.dio0_callback.lock().unwrap().as_ref() {
                    cb();
                }
            });
        }
    }
}

struct LoopbackSpi(Arc<LoopbackChip>);

impl SpiDevice for LoopbackSpi {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let reg = buf[0] & 0x7F;
        if buf[0] & REG_FLAG_WRITE != 0 {
            if reg == REG_FIFO {
                self.0.fifo_write(&buf[1..]);
            } else if buf.len() > 1 {
                self.0.write_register(reg, buf[1]);
            }
        } else if reg == REG_FIFO {
            let data = self.0.fifo_read(buf.len().saturating_sub(1));
            buf[1..].copy_from_slice(&data);
        } else if buf.len() > 1 {
            buf[1] = self.0.read_register(reg);
        }
        Ok(())
    }
}

struct LoopbackDio0(Arc<LoopbackChip>);

impl GpioPin for LoopbackDio0 {
    fn read(&self) -> Result<bool> {
        Ok(false)
    }

    fn on_edge(&mut self, _edge: Edge, callback: Box<dyn Fn() + Send + 'static>) -> Result<()> {
        *self.0.dio0_callback.lock().unwrap() = Some(callback);
        Ok(())
    }
}

struct LoopbackDio5(Arc<LoopbackChip>);

impl GpioPin for LoopbackDio5 {
    fn read(&self) -> Result<bool> {
        Ok(false)
    }

    fn on_edge(&mut self, _edge: Edge, callback: Box<dyn Fn() + Send + 'static>) -> Result<()> {
        *self.0.dio5_callback.lock().unwrap() = Some(callback);
        Ok(())
    }
}

pub fn test_radio_config() -> RadioConfig {
    RadioConfig {
        pa_boost: true,
        pa_output_power: 15,
        pa_max_power: 7,
        frequency: 434_000_000.0,
        frequency_hop_enabled: false,
        frequency_hop_period: 0,
        implicit_header_mode: false,
        error_coding_rate: ErrorCodingRate::Rate4_5,
        bandwidth: Bandwidth::Bw125,
        spreading_factor: 8,
        crc: true,
        low_data_rate_optimize: false,
        preamble_length: 8,
        iq_inverted: false,
        receive_timeout_symbols: 50,
        expected_payload_length: 0,
    }
}

pub fn fast_transceiver_config() -> TransceiverConfig {
    TransceiverConfig {
        transmit_buffer_length_packets: 16,
        receive_buffer_length_packets: 16,
        transmit_timeout_milliseconds: 1_000,
        poll_interval_milliseconds: 5,
        maximum_receive_time_milliseconds: 150,
    }
}

pub fn fast_protocol_config() -> CommProtocolConfig {
    CommProtocolConfig {
        passive_mode: false,
        transmit_all_data: false,
        ignore_errors: false,
        receive_buffer_length_packets: 16,
        stream_inactivity_timeout_millis: 5_000,
        stream_acknowledgement_interval_packet_count: 4,
        stream_acknowledgement_receive_timeout_millis: 300,
        stream_acknowledgement_guard_interval_millis: 20,
        stream_acknowledgement_max_rerequest_count: 3,
        stream_end_of_stream_acknowledgement_max_rerequest_count: 3,
        transmit_stream_count: 4,
        receive_stream_count: 4,
    }
}

/// A pair of loopback chips, exposed so individual tests can install a drop
/// filter on either side before driving traffic across them.
pub struct RadioPair {
    pub node: Arc<RadioDriver>,
    pub node_chip: Arc<LoopbackChip>,
    pub gateway: Arc<RadioDriver>,
    pub gateway_chip: Arc<LoopbackChip>,
}

pub fn new_radio_pair(config: RadioConfig) -> RadioPair {
    let node_chip = LoopbackChip::new();
    let gateway_chip = LoopbackChip::new();
    LoopbackChip::link(&node_chip, &gateway_chip);

    let node = RadioDriver::new(
        Box::new(LoopbackSpi(Arc::clone(&node_chip))),
        Box::new(LoopbackDio0(Arc::clone(&node_chip))),
        Box::new(LoopbackDio5(Arc::clone(&node_chip))),
        config,
        config,
        false,
    )
    .expect("node radio driver construction");

    let gateway = RadioDriver::new(
        Box::new(LoopbackSpi(Arc::clone(&gateway_chip))),
        Box::new(LoopbackDio0(Arc::clone(&gateway_chip))),
        Box::new(LoopbackDio5(Arc::clone(&gateway_chip))),
        config,
        config,
        false,
    )
    .expect("gateway radio driver construction");

    RadioPair { node, node_chip, gateway, gateway_chip }
}

pub struct Node {
    pub transceiver: Arc<Transceiver>,
    pub engine: Arc<ProtocolEngine>,
    pub event_bus: Arc<EventBus>,
}

pub fn build_node(
    radio: Arc<RadioDriver>,
    transceiver_config: TransceiverConfig,
    protocol_config: CommProtocolConfig,
) -> Node {
    let transceiver = Transceiver::new(radio, transceiver_config);
    let event_bus = Arc::new(EventBus::new());
    let engine = ProtocolEngine::new(Arc::clone(&transceiver), protocol_config, Arc::clone(&event_bus));
    Node { transceiver, engine, event_bus }
}
