//! Hardware abstraction: SPI byte transfer, GPIO edge interrupts, and a
//! condition-wait utility. The radio driver depends on nothing else.

pub mod spi;
pub mod gpio;
pub mod wait;

pub use gpio::{Edge, GpioPin};
pub use spi::SpiDevice;
pub use wait::Signal;
