//! Serial line settings.

use super::{UartError, UartId, SCRIPT_UART_ID};
use std::fmt;

/// Default line speed.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default driver receive buffer, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Largest receive buffer accepted, in bytes.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    pub fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Bit transmission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Least significant bit first
    #[default]
    Lsb,
    /// Most significant bit first
    Msb,
}

/// Settings for one UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub id: UartId,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub bit_order: BitOrder,
    pub buffer_size: usize,
}

impl UartConfig {
    /// Defaults (115200 8N1, LSB first, 1 KiB buffer) for `id`.
    pub fn new(id: UartId) -> Self {
        Self {
            id,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            bit_order: BitOrder::Lsb,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Native device name for this id.
    pub fn device_name(&self) -> String {
        format!("uart{}", self.id)
    }

    /// Check the line settings. Does not check whether the id is usable.
    pub fn validate(&self) -> Result<(), UartError> {
        if self.baud_rate == 0 {
            return Err(UartError::InvalidConfig("baud rate must be non-zero".into()));
        }
        if !(5..=9).contains(&self.data_bits) {
            return Err(UartError::InvalidConfig(format!(
                "data bits must be 5-9, got {}",
                self.data_bits
            )));
        }
        if self.buffer_size == 0 {
            return Err(UartError::InvalidConfig("buffer size must be non-zero".into()));
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(UartError::InvalidConfig(format!(
                "buffer size must be at most {}, got {}",
                MAX_BUFFER_SIZE, self.buffer_size
            )));
        }
        Ok(())
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::new(SCRIPT_UART_ID)
    }
}

impl fmt::Display for UartConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "uart{} {} {}{}{}",
            self.id,
            self.baud_rate,
            self.data_bits,
            parity,
            self.stop_bits.count()
        )
    }
}
