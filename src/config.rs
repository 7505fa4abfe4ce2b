//! Deserializable configuration surface (recognized keys of the external
//! YAML configuration document).
//!
//! These types only describe the recognized keys; reading a file path,
//! watching it for changes, and merging CLI overrides is left to the
//! embedding application.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{Error, Result};
use crate::radio::config::RadioConfig;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SpiConfig {
    pub bus_index: u16,
    pub device_index: u16,
    pub clock_speed: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PinConfig {
    pub dio0: u8,
    pub dio5: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RadioDeviceConfig {
    pub spi: SpiConfig,
    pub pins: PinConfig,
    pub receive_single_after_detection: bool,
    pub transmit: RadioConfig,
    pub receive: RadioConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TransceiverConfig {
    pub transmit_buffer_length_packets: usize,
    pub receive_buffer_length_packets: usize,
    pub transmit_timeout_milliseconds: u64,
    pub poll_interval_milliseconds: u64,
    pub maximum_receive_time_milliseconds: u64,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        TransceiverConfig {
            transmit_buffer_length_packets: 16,
            receive_buffer_length_packets: 16,
            transmit_timeout_milliseconds: 5000,
            poll_interval_milliseconds: 10,
            maximum_receive_time_milliseconds: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CommProtocolConfig {
    pub passive_mode: bool,
    pub transmit_all_data: bool,
    pub ignore_errors: bool,
    pub receive_buffer_length_packets: usize,
    pub stream_inactivity_timeout_millis: u64,
    pub stream_acknowledgement_interval_packet_count: u32,
    pub stream_acknowledgement_receive_timeout_millis: u64,
    pub stream_acknowledgement_guard_interval_millis: u64,
    pub stream_acknowledgement_max_rerequest_count: u32,
    pub stream_end_of_stream_acknowledgement_max_rerequest_count: u32,
    pub transmit_stream_count: usize,
    pub receive_stream_count: usize,
}

impl Default for CommProtocolConfig {
    fn default() -> Self {
        CommProtocolConfig {
            passive_mode: false,
            transmit_all_data: false,
            ignore_errors: false,
            receive_buffer_length_packets: 16,
            stream_inactivity_timeout_millis: 30_000,
            stream_acknowledgement_interval_packet_count: 8,
            stream_acknowledgement_receive_timeout_millis: 2_000,
            stream_acknowledgement_guard_interval_millis: 100,
            stream_acknowledgement_max_rerequest_count: 3,
            stream_end_of_stream_acknowledgement_max_rerequest_count: 3,
            transmit_stream_count: 4,
            receive_stream_count: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub radio: RadioDeviceConfig,
    pub comm_transceiver: TransceiverConfig,
    pub comm_protocol: CommProtocolConfig,
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Config> {
        serde_yaml::from_str(s).map_err(|e| Error::InvalidArg(e.to_string()))
    }

    pub fn from_reader<R: Read>(mut r: R) -> Result<Config> {
        let mut buf = String::new();
        r.read_to_string(&mut buf)?;
        Config::from_yaml_str(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::config::Bandwidth;

    const SAMPLE_YAML: &str = r#"
radio:
  spi:
    bus_index: 0
    device_index: 0
    clock_speed: 500000
  pins:
    dio0: 17
    dio5: 27
  receive_single_after_detection: false
  transmit:
    pa_boost: true
    pa_output_power: 15
    pa_max_power: 7
    frequency: 915000000.0
    frequency_hop_enabled: false
    frequency_hop_period: 0
    implicit_header_mode: false
    error_coding_rate: "4:5"
    bandwidth: "125K"
    spreading_factor: 9
    crc: true
    low_data_rate_optimize: false
    preamble_length: 8
    iq_inverted: false
    receive_timeout_symbols: 50
    expected_payload_length: 0
  receive:
    pa_boost: true
    pa_output_power: 15
    pa_max_power: 7
    frequency: 915000000.0
    frequency_hop_enabled: false
    frequency_hop_period: 0
    implicit_header_mode: false
    error_coding_rate: "4:5"
    bandwidth: "125K"
    spreading_factor: 9
    crc: true
    low_data_rate_optimize: false
    preamble_length: 8
    iq_inverted: false
    receive_timeout_symbols: 50
    expected_payload_length: 0
comm_transceiver:
  transmit_buffer_length_packets: 16
  receive_buffer_length_packets: 16
  transmit_timeout_milliseconds: 5000
  poll_interval_milliseconds: 10
  maximum_receive_time_milliseconds: 200
comm_protocol:
  passive_mode: false
  transmit_all_data: false
  ignore_errors: false
  receive_buffer_length_packets: 16
  stream_inactivity_timeout_millis: 30000
  stream_acknowledgement_interval_packet_count: 8
  stream_acknowledgement_receive_timeout_millis: 2000
  stream_acknowledgement_guard_interval_millis: 100
  stream_acknowledgement_max_rerequest_count: 3
  stream_end_of_stream_acknowledgement_max_rerequest_count: 3
  transmit_stream_count: 4
  receive_stream_count: 4
"#;

    #[test]
    fn sample_document_parses() {
        let config = Config::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.radio.spi.bus_index, 0);
        assert_eq!(config.radio.pins.dio0, 17);
        assert_eq!(config.radio.transmit.bandwidth, Bandwidth::Bw125);
        assert_eq!(config.comm_protocol.transmit_stream_count, 4);
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(Config::from_yaml_str("not: [valid, radio config").is_err());
    }

    #[test]
    fn transceiver_and_protocol_defaults_are_self_consistent() {
        let transceiver = TransceiverConfig::default();
        assert!(transceiver.transmit_buffer_length_packets > 0);
        let protocol = CommProtocolConfig::default();
        assert!(protocol.stream_acknowledgement_max_rerequest_count > 0);
    }
}
