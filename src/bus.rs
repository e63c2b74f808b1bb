use async_trait::async_trait;
use thiserror::Error;

/// I2C transport errors. A `Timeout` is recoverable at the channel level;
/// `Transfer` covers NACKs and controller I/O failures.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("I2C transfer failed: {0}")]
    Transfer(String),

    #[error("I2C operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("GPIO line control failed: {0}")]
    Gpio(String),

    #[error("I2C is only supported on Linux")]
    Unsupported,
}

/// Pin assignment for the two bus lines. Needed when the lines are
/// temporarily repurposed as plain GPIO during bus recovery.
#[derive(Debug, Clone, Copy)]
pub struct BusPins {
    pub sda: u8,
    pub scl: u8,
}

/// Register-level transport for a device with 16-bit register indices,
/// plus the two primitives the manual bus-recovery procedure needs.
///
/// Recovery is a bus-wide side effect: callers must hold exclusive access
/// to the bus while `pulse_clock_line` or `reinit` runs.
#[async_trait]
pub trait BusTransport: Send {
    async fn read_reg(&mut self, address: u8, reg: u16) -> Result<u8, BusError>;
    async fn read_reg16(&mut self, address: u8, reg: u16) -> Result<u16, BusError>;
    async fn write_reg(&mut self, address: u8, reg: u16, value: u8) -> Result<(), BusError>;
    async fn write_reg16(&mut self, address: u8, reg: u16, value: u16) -> Result<(), BusError>;

    /// Drive SCL as a plain digital output through `pulses` low/high cycles
    /// (~10us per level, SDA held as input pull-up) so a peripheral stuck
    /// mid-transaction releases the data line. Lines return to bus mode on
    /// completion.
    fn pulse_clock_line(&mut self, pulses: u8) -> Result<(), BusError>;

    /// Reopen the bus controller at the stability clock rate.
    fn reinit(&mut self) -> Result<(), BusError>;
}

/// I2C bus implementation
#[cfg(target_os = "linux")]
pub struct I2cBus {
    device: i2cdev::linux::LinuxI2CDevice,
    path: String,
    pins: BusPins,
    clock_hz: u32,
}

#[cfg(not(target_os = "linux"))]
pub struct I2cBus {
    _phantom: std::marker::PhantomData<()>,
}

#[cfg(target_os = "linux")]
impl I2cBus {
    /// Open the character device. `clock_hz` is recorded for diagnostics;
    /// the controller rate itself is fixed by the platform device tree.
    pub fn new(path: &str, pins: BusPins, clock_hz: u32) -> Result<Self, BusError> {
        let device = i2cdev::linux::LinuxI2CDevice::new(path, 0)
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        Ok(Self {
            device,
            path: path.to_string(),
            pins,
            clock_hz,
        })
    }

    fn select(&mut self, address: u8) -> Result<(), BusError> {
        use i2cdev::core::I2CDevice;
        self.device
            .set_slave_address(address as u16)
            .map_err(|e| BusError::Transfer(e.to_string()))
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl BusTransport for I2cBus {
    async fn read_reg(&mut self, address: u8, reg: u16) -> Result<u8, BusError> {
        use i2cdev::core::I2CDevice;
        self.select(address)?;
        // 16-bit register index, so plain write-then-read instead of SMBus.
        self.device
            .write(&[(reg >> 8) as u8, reg as u8])
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        let mut buf = [0u8; 1];
        self.device
            .read(&mut buf)
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        Ok(buf[0])
    }

    async fn read_reg16(&mut self, address: u8, reg: u16) -> Result<u16, BusError> {
        use i2cdev::core::I2CDevice;
        self.select(address)?;
        self.device
            .write(&[(reg >> 8) as u8, reg as u8])
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        let mut buf = [0u8; 2];
        self.device
            .read(&mut buf)
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        Ok(u16::from_be_bytes(buf))
    }

    async fn write_reg(&mut self, address: u8, reg: u16, value: u8) -> Result<(), BusError> {
        use i2cdev::core::I2CDevice;
        self.select(address)?;
        self.device
            .write(&[(reg >> 8) as u8, reg as u8, value])
            .map_err(|e| BusError::Transfer(e.to_string()))
    }

    async fn write_reg16(&mut self, address: u8, reg: u16, value: u16) -> Result<(), BusError> {
        use i2cdev::core::I2CDevice;
        self.select(address)?;
        self.device
            .write(&[(reg >> 8) as u8, reg as u8, (value >> 8) as u8, value as u8])
            .map_err(|e| BusError::Transfer(e.to_string()))
    }

    fn pulse_clock_line(&mut self, pulses: u8) -> Result<(), BusError> {
        use rppal::gpio::Gpio;

        let gpio = Gpio::new().map_err(|e| BusError::Gpio(e.to_string()))?;
        let mut scl = gpio
            .get(self.pins.scl)
            .map_err(|e| BusError::Gpio(e.to_string()))?
            .into_output();
        let _sda = gpio
            .get(self.pins.sda)
            .map_err(|e| BusError::Gpio(e.to_string()))?
            .into_input_pullup();

        for _ in 0..pulses {
            scl.set_low();
            std::thread::sleep(std::time::Duration::from_micros(10));
            scl.set_high();
            std::thread::sleep(std::time::Duration::from_micros(10));
        }
        // Pins revert to their previous mode on drop, returning the lines
        // to the bus controller.
        Ok(())
    }

    fn reinit(&mut self) -> Result<(), BusError> {
        self.device = i2cdev::linux::LinuxI2CDevice::new(&self.path, 0)
            .map_err(|e| BusError::Transfer(e.to_string()))?;
        tracing::info!(
            "[bus] reinitialized {} (sda:{} scl:{} @ {}Hz)",
            self.path,
            self.pins.sda,
            self.pins.scl,
            self.clock_hz
        );
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl I2cBus {
    pub fn new(_path: &str, _pins: BusPins, _clock_hz: u32) -> Result<Self, BusError> {
        Err(BusError::Unsupported)
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl BusTransport for I2cBus {
    async fn read_reg(&mut self, _address: u8, _reg: u16) -> Result<u8, BusError> {
        Err(BusError::Unsupported)
    }

    async fn read_reg16(&mut self, _address: u8, _reg: u16) -> Result<u16, BusError> {
        Err(BusError::Unsupported)
    }

    async fn write_reg(&mut self, _address: u8, _reg: u16, _value: u8) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }

    async fn write_reg16(&mut self, _address: u8, _reg: u16, _value: u16) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }

    fn pulse_clock_line(&mut self, _pulses: u8) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }

    fn reinit(&mut self) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }
}
