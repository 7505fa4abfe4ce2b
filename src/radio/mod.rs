//! The LoRa-style radio driver: mode state machine, per-direction
//! configuration, IRQ handling and FIFO I/O over a single SX127x-class chip.

pub mod config;
pub mod driver;
pub mod registers;
pub mod status;

pub use config::{Bandwidth, ErrorCodingRate, RadioConfig};
pub use driver::RadioDriver;
pub use status::{RadioMode, RadioStatus};
