//! Per-direction radio configuration: the values applied to the
//! chip before entering transmit or receive.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Channel bandwidth, fixed to the 10 values the chip supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Bandwidth {
    #[serde(rename = "7K8")]
    Bw7_8,
    #[serde(rename = "10K4")]
    Bw10_4,
    #[serde(rename = "15K6")]
    Bw15_6,
    #[serde(rename = "20K8")]
    Bw20_8,
    #[serde(rename = "31K25")]
    Bw31_25,
    #[serde(rename = "41K7")]
    Bw41_7,
    #[serde(rename = "62K5")]
    Bw62_5,
    #[serde(rename = "125K")]
    Bw125,
    #[serde(rename = "250K")]
    Bw250,
    #[serde(rename = "500K")]
    Bw500,
}

impl Bandwidth {
    /// The 4-bit field value written into Modem Config 1 bits 4..7.
    pub fn register_value(self) -> u8 {
        match self {
            Bandwidth::Bw7_8 => 0x0,
            Bandwidth::Bw10_4 => 0x1,
            Bandwidth::Bw15_6 => 0x2,
            Bandwidth::Bw20_8 => 0x3,
            Bandwidth::Bw31_25 => 0x4,
            Bandwidth::Bw41_7 => 0x5,
            Bandwidth::Bw62_5 => 0x6,
            Bandwidth::Bw125 => 0x7,
            Bandwidth::Bw250 => 0x8,
            Bandwidth::Bw500 => 0x9,
        }
    }

    pub fn hz(self) -> f64 {
        match self {
            Bandwidth::Bw7_8 => 7_800.0,
            Bandwidth::Bw10_4 => 10_400.0,
            Bandwidth::Bw15_6 => 15_600.0,
            Bandwidth::Bw20_8 => 20_800.0,
            Bandwidth::Bw31_25 => 31_250.0,
            Bandwidth::Bw41_7 => 41_700.0,
            Bandwidth::Bw62_5 => 62_500.0,
            Bandwidth::Bw125 => 125_000.0,
            Bandwidth::Bw250 => 250_000.0,
            Bandwidth::Bw500 => 500_000.0,
        }
    }
}

/// Error-coding rate, expressed as the denominator family `4/5`..`4/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ErrorCodingRate {
    #[serde(rename = "4:5")]
    Rate4_5,
    #[serde(rename = "4:6")]
    Rate4_6,
    #[serde(rename = "4:7")]
    Rate4_7,
    #[serde(rename = "4:8")]
    Rate4_8,
}

impl ErrorCodingRate {
    /// The 3-bit field value written into Modem Config 1 bits 1..3.
    pub fn register_value(self) -> u8 {
        match self {
            ErrorCodingRate::Rate4_5 => 0x1,
            ErrorCodingRate::Rate4_6 => 0x2,
            ErrorCodingRate::Rate4_7 => 0x3,
            ErrorCodingRate::Rate4_8 => 0x4,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RadioConfig {
    pub pa_boost: bool,
    pub pa_output_power: u8,
    pub pa_max_power: u8,
    pub frequency: f64,
    pub frequency_hop_enabled: bool,
    pub frequency_hop_period: u8,
    pub implicit_header_mode: bool,
    pub error_coding_rate: ErrorCodingRate,
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    pub crc: bool,
    pub low_data_rate_optimize: bool,
    pub preamble_length: u16,
    pub iq_inverted: bool,
    pub receive_timeout_symbols: u16,
    pub expected_payload_length: u8,
}

impl RadioConfig {
    pub fn validate(&self) -> Result<()> {
        if !(6..=12).contains(&self.spreading_factor) {
            return Err(Error::InvalidArg("spreading_factor out of range".into()));
        }
        if self.spreading_factor == 6 && !self.implicit_header_mode {
            return Err(Error::InvalidArg(
                "spreading factor 6 requires implicit header mode".into(),
            ));
        }
        if self.pa_output_power > 0x0F {
            return Err(Error::InvalidArg("pa_output_power out of range".into()));
        }
        if self.pa_max_power > 0x07 {
            return Err(Error::InvalidArg("pa_max_power out of range".into()));
        }
        Ok(())
    }
}
