//! Half-duplex transceiver multiplexing and the reliable stream protocol
//! built on top of it.

pub mod protocol;
pub mod transceiver;
