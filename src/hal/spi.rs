//! SPI byte transfer capability, backed by `spidev` on Linux.

use crate::error::Result;

/// Full-duplex byte transfer: `buf` is both written and overwritten in place.
pub trait SpiDevice {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<()>;
}

#[cfg(feature = "linux")]
pub struct LinuxSpi {
    inner: spidev::Spidev,
}

#[cfg(feature = "linux")]
impl LinuxSpi {
    pub fn open(bus_index: u16, device_index: u16, clock_speed: u32) -> Result<LinuxSpi> {
        use spidev::{SpiModeFlags, Spidev, SpidevOptions};

        let path = format!("/dev/spidev{}.{}", bus_index, device_index);
        let mut spi = Spidev::open(&path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(clock_speed)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;
        Ok(LinuxSpi { inner: spi })
    }
}

#[cfg(feature = "linux")]
impl SpiDevice for LinuxSpi {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<()> {
        use spidev::SpidevTransfer;

        let mut rx = vec![0u8; buf.len()];
        {
            let mut transfer = SpidevTransfer::read_write(buf, &mut rx);
            self.inner.transfer(&mut transfer)?;
        }
        buf.copy_from_slice(&rx);
        Ok(())
    }
}
