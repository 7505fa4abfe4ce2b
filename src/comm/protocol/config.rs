pub use crate::config::CommProtocolConfig;
