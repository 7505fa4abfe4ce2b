//! Packet framing and the reliable multi-stream protocol.

pub mod config;
pub mod engine;
pub mod json;
pub mod packet;
pub mod stream;
pub mod table;

pub use config::CommProtocolConfig;
pub use engine::{ProtocolEngine, StreamHandle};
pub use packet::{Packet, PacketType};
pub use stream::{StreamInfo, StreamType};
