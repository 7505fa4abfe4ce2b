//! Radio mode and counters, guarded by a dedicated status mutex so
//! `get_status` always copies out an internally consistent snapshot.

use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Sleep,
    Standby,
    Transmit,
    Detection,
    ReceiveContinuous,
    ReceiveSingle,
}

#[derive(Debug, Clone)]
pub struct RadioStatus {
    pub mode: RadioMode,
    pub chip_version: u8,
    pub last_packet_rssi: f32,
    pub last_packet_snr: f32,
    pub modem_clear: bool,
    pub header_info_valid: bool,
    pub rx_active: bool,
    pub signal_synchronized: bool,
    pub signal_detected: bool,

    pub transmitted_packet_count: u64,
    pub transmitted_bytes: u64,
    pub received_packet_count: u64,
    pub received_bytes: u64,
    pub invalid_received_packet_count: u64,

    pub last_transmitted_packet_timestamp: Option<SystemTime>,
    pub last_received_packet_timestamp: Option<SystemTime>,
    pub last_invalid_received_packet_timestamp: Option<SystemTime>,
}

impl Default for RadioStatus {
    fn default() -> Self {
        RadioStatus {
            mode: RadioMode::Sleep,
            chip_version: 0,
            last_packet_rssi: 0.0,
            last_packet_snr: 0.0,
            modem_clear: false,
            header_info_valid: false,
            rx_active: false,
            signal_synchronized: false,
            signal_detected: false,
            transmitted_packet_count: 0,
            transmitted_bytes: 0,
            received_packet_count: 0,
            received_bytes: 0,
            invalid_received_packet_count: 0,
            last_transmitted_packet_timestamp: None,
            last_received_packet_timestamp: None,
            last_invalid_received_packet_timestamp: None,
        }
    }
}

pub(crate) enum CounterEvent {
    Transmit(u64),
    Receive(u64),
    ReceiveInvalid,
}

pub(crate) struct StatusCell {
    inner: Mutex<RadioStatus>,
}

impl StatusCell {
    pub fn new() -> StatusCell {
        StatusCell {
            inner: Mutex::new(RadioStatus::default()),
        }
    }

    pub fn snapshot(&self) -> RadioStatus {
        self.inner.lock().unwrap().clone()
    }

    pub fn set_mode(&self, mode: RadioMode) {
        self.inner.lock().unwrap().mode = mode;
    }

    pub fn record(&self, event: CounterEvent) {
        let mut status = self.inner.lock().unwrap();
        match event {
            CounterEvent::Transmit(bytes) => {
                status.transmitted_packet_count += 1;
                status.transmitted_bytes += bytes;
                status.last_transmitted_packet_timestamp = Some(SystemTime::now());
            }
            CounterEvent::Receive(bytes) => {
                status.received_packet_count += 1;
                status.received_bytes += bytes;
                status.last_received_packet_timestamp = Some(SystemTime::now());
            }
            CounterEvent::ReceiveInvalid => {
                status.invalid_received_packet_count += 1;
                status.last_invalid_received_packet_timestamp = Some(SystemTime::now());
            }
        }
    }

    pub fn update_from_chip(
        &self,
        chip_version: Option<u8>,
        rssi: f32,
        snr: f32,
        modem_status: u8,
    ) {
        use super::registers::*;
        let mut status = self.inner.lock().unwrap();
        if let Some(version) = chip_version {
            status.chip_version = version;
        }
        status.last_packet_rssi = rssi;
        status.last_packet_snr = snr;
        status.signal_detected = modem_status & STATUS_SIGNAL_DETECTED != 0;
        status.signal_synchronized = modem_status & STATUS_SIGNAL_SYNCHRONIZED != 0;
        status.rx_active = modem_status & STATUS_RX_ACTIVE != 0;
        status.header_info_valid = modem_status & STATUS_HEADER_INFO_VALID != 0;
        status.modem_clear = modem_status & STATUS_MODEM_CLEAR != 0;
    }
}
