//! SX127x/RFM9xW register addresses and bitfield constants.
//!
//! Values transcribed from the chip's own register map as used by the
//! original driver; kept as plain constants rather than a bitflags type
//! since most are single-register opcodes, not combinable flag sets.

pub const REG_FLAG_WRITE: u8 = 0x80;

// Common registers
pub const REG_FIFO: u8 = 0x00;
pub const REG_OPMODE: u8 = 0x01;
pub const REG_RF_CARRIER_FREQ_MSB: u8 = 0x06;
pub const REG_RF_CARRIER_FREQ_MID: u8 = 0x07;
pub const REG_RF_CARRIER_FREQ_LSB: u8 = 0x08;
pub const REG_PA_CONFIG: u8 = 0x09;
pub const REG_LNA: u8 = 0x0C;
pub const REG_DIO_MAPPING_1: u8 = 0x40;
pub const REG_VERSION: u8 = 0x42;

// LoRa mode registers
pub const REG_LORA_FIFO_ADDR_PTR: u8 = 0x0D;
pub const REG_LORA_FIFO_TX_BASE_ADDR: u8 = 0x0E;
pub const REG_LORA_FIFO_RX_BASE_ADDR: u8 = 0x0F;
pub const REG_LORA_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
pub const REG_LORA_IRQ_FLAGS_MASK: u8 = 0x11;
pub const REG_LORA_IRQ_FLAGS: u8 = 0x12;
pub const REG_LORA_RX_NB_BYTES: u8 = 0x13;
pub const REG_LORA_MODEM_STATUS: u8 = 0x18;
pub const REG_LORA_PACKET_SNR: u8 = 0x19;
pub const REG_LORA_PACKET_RSSI: u8 = 0x1A;
pub const REG_LORA_CURRENT_RSSI: u8 = 0x1B;
pub const REG_LORA_MODEM_CONFIG_1: u8 = 0x1D;
pub const REG_LORA_MODEM_CONFIG_2: u8 = 0x1E;
pub const REG_LORA_SYMB_TIMEOUT_LSB: u8 = 0x1F;
pub const REG_LORA_PREAMBLE_MSB: u8 = 0x20;
pub const REG_LORA_PREAMBLE_LSB: u8 = 0x21;
pub const REG_LORA_PAYLOAD_LENGTH: u8 = 0x22;
pub const REG_LORA_MAX_PAYLOAD_LENGTH: u8 = 0x23;
pub const REG_LORA_HOP_PERIOD: u8 = 0x24;
pub const REG_LORA_MODEM_CONFIG_3: u8 = 0x26;
pub const REG_LORA_FREQ_ERROR_MSB: u8 = 0x28;
pub const REG_LORA_FREQ_ERROR_MID: u8 = 0x29;
pub const REG_LORA_FREQ_ERROR_LSB: u8 = 0x2A;
pub const REG_LORA_DETECTION_OPTIMIZE: u8 = 0x31;
pub const REG_LORA_INVERT_IQ: u8 = 0x33;
pub const REG_LORA_DETECTION_THRESHOLD: u8 = 0x37;
pub const REG_LORA_INVERT_IQ_2: u8 = 0x3B;

// Modes (REG_OPMODE low 3 bits)
pub const MODE_LORA_SLEEP: u8 = 0x00;
pub const MODE_LORA_STANDBY: u8 = 0x01;
pub const MODE_LORA_FSTX: u8 = 0x02;
pub const MODE_LORA_TX: u8 = 0x03;
pub const MODE_LORA_FSRX: u8 = 0x04;
pub const MODE_LORA_RX_CONTINUOUS: u8 = 0x05;
pub const MODE_LORA_RX_SINGLE: u8 = 0x06;
pub const MODE_LORA_CAD: u8 = 0x07;
pub const MODE_FLAG_LORA: u8 = 0x80;

// Modem Config 2
pub const CRC_OFF: u8 = 0x00;
pub const CRC_ON: u8 = 0x04;

// Modem Config 3
pub const MC3_AGC_AUTO_ON: u8 = 0x04;
pub const MC3_LOW_DATA_RATE_OPTIMIZE: u8 = 0x08;

// Modem Status
pub const STATUS_SIGNAL_DETECTED: u8 = 0x01;
pub const STATUS_SIGNAL_SYNCHRONIZED: u8 = 0x02;
pub const STATUS_RX_ACTIVE: u8 = 0x04;
pub const STATUS_HEADER_INFO_VALID: u8 = 0x08;
pub const STATUS_MODEM_CLEAR: u8 = 0x10;

// Detection Optimize / Threshold
pub const DETECTION_OPTIMIZE_SF6: u8 = 0x05;
pub const DETECTION_OPTIMIZE_SF7_TO_SF12: u8 = 0x03;
pub const DETECTION_THRESHOLD_SF6: u8 = 0x0C;
pub const DETECTION_THRESHOLD_SF7_TO_SF12: u8 = 0x0A;

// Low Noise Amplifier
pub const LNA_GAIN_OFF: u8 = 0x00;
pub const LNA_BOOST_HF_ON: u8 = 0x03;

// Invert IQ
pub const LORA_INVERT_IQ_RX_MASK: u8 = 0xBF;
pub const LORA_INVERT_IQ_RX_OFF: u8 = 0x00;
pub const LORA_INVERT_IQ_RX_ON: u8 = 0x40;
pub const LORA_INVERT_IQ_TX_MASK: u8 = 0xFE;
pub const LORA_INVERT_IQ_TX_OFF: u8 = 0x01;
pub const LORA_INVERT_IQ_TX_ON: u8 = 0x00;
pub const LORA_INVERT_IQ_2_ON: u8 = 0x19;
pub const LORA_INVERT_IQ_2_OFF: u8 = 0x1D;

// IRQ flags / mask (same bit positions)
pub const IRQ_FLAG_CAD_DETECTED: u8 = 0x01;
pub const IRQ_FLAG_CAD_DONE: u8 = 0x04;
pub const IRQ_FLAG_TX_DONE: u8 = 0x08;
pub const IRQ_FLAG_PAYLOAD_CRC_ERROR: u8 = 0x20;
pub const IRQ_FLAG_RX_DONE: u8 = 0x40;
pub const IRQ_FLAG_RX_TIMEOUT: u8 = 0x80;

pub const RFM9XW_LORA_PACKET_LENGTH_MAX: u8 = 0xFF;
pub const RFM9XW_RSSI_MINIMUM_HF: i32 = -157;
pub const RFM9XW_CRYSTAL_FREQUENCY: f64 = 32_000_000.0;
pub const RFM9XW_FREQUENCY_STEP: f64 = RFM9XW_CRYSTAL_FREQUENCY / (1u32 << 19) as f64;
pub const RFM9XW_MODE_CHANGE_TIMEOUT_MILLIS: u64 = 5000;
