//! # infnoise
//!
//! Rust driver for the Infinite Noise TRNG (Infinite Noise Multiplier over
//! an FT240X USB FIFO).
//!
//! Each transaction exchanges one 512-byte buffer with the device. The
//! samples are debiased into one bit per live sample, checked by a
//! streaming health test, and then either packed directly (raw mode) or
//! absorbed into a Keccak-f[1600] sponge and squeezed (whitened mode).
//!
//! ## Quick Start
//!
//! ```no_run
//! use infnoise::{InfNoise, OutputMode};
//!
//! let mut trng = InfNoise::open(None, true, false)?;
//!
//! // Keccak-whitened output, 256 bits per raw buffer
//! let mut buf = [0u8; 32];
//! trng.read_data(&mut buf, OutputMode::Whitened { multiplier: 1 })?;
//! println!("{:02x?}", &buf);
//!
//! // Debiased but unconditioned output, for diagnostics
//! let n = trng.read_data(&mut buf, OutputMode::Raw)?;
//! println!("{:02x?}", &buf[..n]);
//! # Ok::<(), infnoise::ReadError>(())
//! ```
//!
//! ## Discarding failed reads
//!
//! `read_data` fills the caller's buffer in place. When it returns
//! [`ReadError`], the `written` bytes are **not** usable as random data and
//! must be discarded along with the rest of the buffer.

pub mod device;
pub mod discovery;
pub mod health;
pub mod protocol;
pub mod serial;
pub mod sponge;
pub mod types;

pub use device::{InfNoise, SessionState};
pub use discovery::{find_device, list_devices};
pub use health::{HealthChecker, HealthConfig, HealthFailure, HealthStats, HealthVerdict};
pub use serial::{SerialTransport, Transport};
pub use sponge::Sponge;
pub use types::*;

/// Errors returned by the infnoise driver.
#[derive(Debug, thiserror::Error)]
pub enum InfnoiseError {
    /// No Infinite Noise device matched the selector.
    #[error("No Infinite Noise device found")]
    NoDevice,

    /// The device was found but could not be opened or failed the handshake.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A buffer exchange failed mid-session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The noise source failed its health test.
    #[error("Health check failed: {0}")]
    Health(#[from] HealthFailure),

    /// Whitened output was requested from a session opened without the sponge.
    #[error("Keccak conditioner was not enabled when the session was opened")]
    ConditionerDisabled,

    /// A previous transport failure left the session unusable.
    #[error("Session is unusable after a transport failure; reopen the device")]
    SessionFailed,
}

/// A failed [`InfNoise::read_data`] call.
///
/// `written` bytes of the caller's buffer were filled before the failure.
/// They are unverified and must be discarded.
#[derive(Debug, thiserror::Error)]
#[error("{kind} ({written} bytes written before failure, discard them)")]
pub struct ReadError {
    pub written: usize,
    #[source]
    pub kind: InfnoiseError,
}

impl ReadError {
    pub(crate) fn new(written: usize, kind: InfnoiseError) -> Self {
        Self { written, kind }
    }
}

impl From<InfnoiseError> for ReadError {
    fn from(kind: InfnoiseError) -> Self {
        Self { written: 0, kind }
    }
}
