//! GPIO capability: level I/O plus edge-triggered interrupts.
//!
//! Two backends exist, mirroring the sysfs/mmap split the driver has always
//! shipped for Linux: `SysfsGpio` (default, portable) and `RppalGpio`
//! (feature `rpi_accel`, lower edge-to-callback latency on a Raspberry Pi).

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// A single GPIO input pin capable of registering an edge interrupt.
///
/// The callback runs on a dedicated thread owned by the pin, never on the
/// caller's thread.
pub trait GpioPin: Send {
    fn read(&self) -> Result<bool>;

    fn on_edge(&mut self, edge: Edge, callback: Box<dyn Fn() + Send + 'static>) -> Result<()>;
}

#[cfg(feature = "linux")]
pub struct SysfsGpio {
    pin: sysfs_gpio::Pin,
}

#[cfg(feature = "linux")]
impl SysfsGpio {
    pub fn open_input(pin_num: u64) -> Result<SysfsGpio> {
        let pin = sysfs_gpio::Pin::new(pin_num);
        pin.export()?;
        pin.set_direction(sysfs_gpio::Direction::In)?;
        Ok(SysfsGpio { pin })
    }
}

#[cfg(feature = "linux")]
impl GpioPin for SysfsGpio {
    fn read(&self) -> Result<bool> {
        Ok(self.pin.get_value()? != 0)
    }

    fn on_edge(&mut self, edge: Edge, callback: Box<dyn Fn() + Send + 'static>) -> Result<()> {
        let sysfs_edge = match edge {
            Edge::Rising => sysfs_gpio::Edge::RisingEdge,
            Edge::Falling => sysfs_gpio::Edge::FallingEdge,
            Edge::Both => sysfs_gpio::Edge::BothEdges,
        };
        self.pin.set_edge(sysfs_edge)?;

        let pin = self.pin.clone();
        std::thread::spawn(move || {
            let mut poller = match pin.get_poller() {
                Ok(p) => p,
                Err(_) => return,
            };
            loop {
                match poller.poll(-1) {
                    Ok(Some(_)) => callback(),
                    Ok(None) => continue,
                    Err(_) => break,
                }
            }
        });
        Ok(())
    }
}

#[cfg(feature = "rpi_accel")]
pub struct RppalGpio {
    pin: rppal::gpio::InputPin,
}

#[cfg(feature = "rpi_accel")]
impl RppalGpio {
    pub fn open_input(pin_num: u8) -> Result<RppalGpio> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| crate::error::Error::Io(e.to_string()))?;
        let pin = gpio
            .get(pin_num)
            .map_err(|e| crate::error::Error::Io(e.to_string()))?
            .into_input();
        Ok(RppalGpio { pin })
    }
}

#[cfg(feature = "rpi_accel")]
impl GpioPin for RppalGpio {
    fn read(&self) -> Result<bool> {
        Ok(self.pin.is_high())
    }

    fn on_edge(&mut self, edge: Edge, callback: Box<dyn Fn() + Send + 'static>) -> Result<()> {
        let trigger = match edge {
            Edge::Rising => rppal::gpio::Trigger::RisingEdge,
            Edge::Falling => rppal::gpio::Trigger::FallingEdge,
            Edge::Both => rppal::gpio::Trigger::Both,
        };
        self.pin
            .set_async_interrupt(trigger, move |_level| callback())
            .map_err(|e| crate::error::Error::Io(e.to_string()))
    }
}
