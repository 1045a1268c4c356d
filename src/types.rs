use std::time::Duration;

use crate::health::HealthConfig;

/// Output format for [`InfNoise::read_data`](crate::InfNoise::read_data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Debiased bits packed MSB-first, no cryptographic conditioning.
    Raw,
    /// Keccak-conditioned output.
    ///
    /// Each raw buffer absorbed yields `256 * multiplier` bits, squeezed in
    /// blocks of at most 1024 bits from the same absorbed state. A
    /// multiplier of 0 emits only as many bytes as the measured entropy of
    /// the buffer supports.
    Whitened { multiplier: u32 },
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Whitened { multiplier: 1 }
    }
}

/// One Infinite Noise device found on the USB bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position in discovery order.
    pub id: u8,
    pub manufacturer: String,
    pub description: String,
    pub serial: String,
    /// OS path of the device node (e.g. `/dev/ttyUSB0`).
    pub port: String,
}

/// Options applied when opening a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Create the Keccak sponge. Required for [`OutputMode::Whitened`].
    pub conditioner: bool,
    /// Log per-buffer health statistics at `info` instead of `trace`.
    pub debug: bool,
    /// Transport read timeout per exchange.
    pub timeout: Duration,
    pub health: HealthConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conditioner: true,
            debug: false,
            timeout: Duration::from_secs(2),
            health: HealthConfig::default(),
        }
    }
}
