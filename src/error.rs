use thiserror::Error;

/// Tagged result kind for every fallible operation exposed by this crate.
///
/// Variants mirror the non-exception error taxonomy of the original driver:
/// callers match on `Error` rather than unwinding.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("operation timed out")]
    Timeout,

    #[error("CRC mismatch")]
    Crc,

    #[error("queue is full")]
    QueueFull,

    #[error("no free stream slot")]
    NoSlot,

    #[error("device busy")]
    Busy,

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("stream failed")]
    StreamFailed,
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(feature = "linux")]
impl From<sysfs_gpio::Error> for Error {
    fn from(e: sysfs_gpio::Error) -> Self {
        Error::Io(e.to_string())
    }
}
