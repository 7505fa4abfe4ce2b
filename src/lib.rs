// Copyright 2017, Romuald Texier-Marcadé <romualdtm@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! A radio driver, half-duplex transceiver multiplexer, and reliable
//! stream protocol for a balloon/vehicle telemetry link over an
//! SX127x-class (RFM9xW) LoRa chip.
//!
//! Three layers, bottom to top:
//!
//! - [`radio`] drives the chip itself: mode state machine, FIFO I/O,
//!   channel-activity detection, RSSI/SNR/frequency-error readback.
//! - [`comm::transceiver`] multiplexes a single half-duplex radio between
//!   a bounded transmit queue and a bounded receive queue.
//! - [`comm::protocol`] frames packets, maintains multiple independent
//!   transmit/receive streams, and handles acknowledgement, retransmission
//!   and the end-of-stream handshake.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! ert-link = "0.1.0"
//! ```
//!
//! If you plan to compile for a Raspberry Pi, enable `rpi_accel` for lower
//! GPIO edge-to-callback latency:
//!
//! ```toml
//! [dependencies.ert-link]
//! version = "0.1.0"
//! features = ["rpi_accel"]
//! ```

pub mod comm;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod hal;
pub mod radio;

pub use comm::protocol::{ProtocolEngine, StreamHandle};
pub use comm::transceiver::Transceiver;
pub use config::Config;
pub use error::{Error, Result};
pub use event_bus::EventBus;
pub use radio::RadioDriver;

use std::sync::Arc;

/// Wires a radio driver, transceiver and protocol engine together from a
/// single [`Config`], using the Linux SPI/GPIO backends.
#[cfg(feature = "linux")]
pub fn open(config: Config) -> Result<(Arc<RadioDriver>, Arc<Transceiver>, Arc<ProtocolEngine>, Arc<EventBus>)> {
    use hal::gpio::SysfsGpio;
    use hal::spi::LinuxSpi;

    let spi = LinuxSpi::open(
        config.radio.spi.bus_index,
        config.radio.spi.device_index,
        config.radio.spi.clock_speed,
    )?;
    let dio0 = SysfsGpio::open_input(config.radio.pins.dio0 as u64)?;
    let dio5 = SysfsGpio::open_input(config.radio.pins.dio5 as u64)?;

    let radio = RadioDriver::new(
        Box::new(spi),
        Box::new(dio0),
        Box::new(dio5),
        config.radio.transmit,
        config.radio.receive,
        config.radio.receive_single_after_detection,
    )?;

    let transceiver = Transceiver::new(Arc::clone(&radio), config.comm_transceiver);
    let event_bus = Arc::new(EventBus::new());
    let engine = ProtocolEngine::new(Arc::clone(&transceiver), config.comm_protocol, Arc::clone(&event_bus));

    Ok((radio, transceiver, engine, event_bus))
}
