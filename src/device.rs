//! High-level Infinite Noise TRNG session.

use std::io;

use crate::discovery::find_device;
use crate::health::{HealthChecker, HealthStats, HealthVerdict};
use crate::protocol::*;
use crate::serial::{SerialTransport, Transport};
use crate::sponge::{Sponge, SQUEEZE_BYTES};
use crate::types::*;
use crate::{InfnoiseError, ReadError};

/// Whitened bits owed per raw buffer for each unit of multiplier.
const BITS_PER_MULTIPLIER: u64 = 256;

/// Lifecycle of an open session. Closing consumes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// A transport exchange failed. Every further read fails; reopen the
    /// device.
    Errored,
}

/// Output owed from the current squeeze block.
#[derive(Debug, Default)]
struct Multiplier {
    num_bits: u64,
    block: Vec<u8>,
    bytes_written: usize,
    /// Entropy credited to buffers absorbed since the last squeeze.
    entropy: u32,
}

impl Multiplier {
    fn reset(&mut self) {
        self.num_bits = 0;
        self.block.clear();
        self.bytes_written = 0;
        self.entropy = 0;
    }

    fn remaining(&self) -> &[u8] {
        &self.block[self.bytes_written..]
    }
}

/// An exclusive session with one Infinite Noise TRNG.
///
/// ```no_run
/// use infnoise::{InfNoise, OutputMode};
///
/// let mut trng = InfNoise::open(None, true, false)?;
/// let mut buf = [0u8; 64];
/// trng.read_data(&mut buf, OutputMode::Whitened { multiplier: 2 })?;
/// println!("{:02x?}", &buf);
/// trng.close();
/// # Ok::<(), infnoise::ReadError>(())
/// ```
pub struct InfNoise<T: Transport = SerialTransport> {
    transport: T,
    request: [u8; BUFLEN],
    health: HealthChecker,
    sponge: Option<Sponge>,
    multiplier: Multiplier,
    state: SessionState,
    debug: bool,
    last_entropy: u32,
}

impl InfNoise<SerialTransport> {
    /// Connect to an Infinite Noise TRNG.
    ///
    /// - `serial`: serial number to select. If `None`, opens the first device found.
    /// - `conditioner`: create the Keccak sponge (required for whitened output).
    /// - `debug`: log per-buffer health statistics at `info`.
    pub fn open(serial: Option<&str>, conditioner: bool, debug: bool) -> Result<Self, InfnoiseError> {
        Self::open_with(
            serial,
            SessionConfig {
                conditioner,
                debug,
                ..SessionConfig::default()
            },
        )
    }

    pub fn open_with(serial: Option<&str>, config: SessionConfig) -> Result<Self, InfnoiseError> {
        let device = find_device(serial)?;
        log::debug!("opening {} (serial {:?})", device.port, device.serial);
        let transport = SerialTransport::open(&device.port, config.timeout)?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> InfNoise<T> {
    /// Start a session over an already-open transport.
    ///
    /// Performs one handshake exchange; the device must echo the clock
    /// pattern or the session is rejected with a connection error.
    pub fn with_transport(mut transport: T, config: SessionConfig) -> Result<Self, InfnoiseError> {
        let request = request_buffer();
        let live = match transport.exchange(&request) {
            Ok(response) => decode_buffer(&response).live(),
            Err(e) => {
                transport.close();
                return Err(InfnoiseError::Connection(format!("Handshake failed: {e}")));
            }
        };
        if live == 0 {
            transport.close();
            return Err(InfnoiseError::Connection(
                "Device did not echo the clock pattern".into(),
            ));
        }
        log::debug!("handshake ok, {live}/{BUFLEN} samples live");

        Ok(Self {
            transport,
            request,
            health: HealthChecker::new(config.health),
            sponge: config.conditioner.then(Sponge::new),
            multiplier: Multiplier::default(),
            state: SessionState::Ready,
            debug: config.debug,
            last_entropy: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_conditioner(&self) -> bool {
        self.sponge.is_some()
    }

    /// Estimated entropy, in bits, of the last healthy buffer.
    pub fn last_entropy(&self) -> u32 {
        self.last_entropy
    }

    pub fn health_stats(&self) -> HealthStats {
        self.health.stats()
    }

    /// Fill `out` with entropy.
    ///
    /// Blocks until `out` is full, pulling as many raw buffers as needed.
    /// Owed multiplier output from a previous call is discarded first.
    ///
    /// On error the `written` count in [`ReadError`] tells how far the
    /// buffer was filled. Those bytes are unverified and the whole buffer
    /// must be discarded. A health failure leaves the session usable; a
    /// transport failure does not.
    pub fn read_data(&mut self, out: &mut [u8], mode: OutputMode) -> Result<usize, ReadError> {
        self.multiplier.reset();
        let result = self.fill(out, mode);
        self.multiplier.reset();
        result
    }

    /// Fill `out` with debiased, unconditioned bits.
    pub fn read_raw_data(&mut self, out: &mut [u8]) -> Result<usize, ReadError> {
        self.read_data(out, OutputMode::Raw)
    }

    /// Close the device.
    pub fn close(self) {
        drop(self);
    }

    /// Fill `out`, starting with whatever output is still owed.
    fn fill(&mut self, out: &mut [u8], mode: OutputMode) -> Result<usize, ReadError> {
        if self.state == SessionState::Errored {
            return Err(InfnoiseError::SessionFailed.into());
        }
        if out.is_empty() {
            return Ok(0);
        }
        match mode {
            OutputMode::Raw => self.read_raw(out),
            OutputMode::Whitened { multiplier } => {
                if self.sponge.is_none() {
                    return Err(InfnoiseError::ConditionerDisabled.into());
                }
                self.read_whitened(out, multiplier)
            }
        }
    }

    fn read_raw(&mut self, out: &mut [u8]) -> Result<usize, ReadError> {
        let mut packer = BitPacker::new();
        let mut written = 0;
        while written < out.len() {
            let Some(decoded) = self.pull().map_err(|e| ReadError::new(written, e))? else {
                continue;
            };
            packer.extend(decoded.bits.iter().map(|b| b.value));
            let bytes = packer.drain_bytes(out.len() - written);
            out[written..written + bytes.len()].copy_from_slice(&bytes);
            written += bytes.len();
        }
        Ok(written)
    }

    fn read_whitened(&mut self, out: &mut [u8], multiplier: u32) -> Result<usize, ReadError> {
        let mut written = 0;
        while written < out.len() {
            let n = self
                .whiten_step(&mut out[written..], multiplier)
                .map_err(|e| ReadError::new(written, e))?;
            written += n;
        }
        Ok(written)
    }

    /// Copy owed output into `out`. When nothing is owed, squeeze the next
    /// block or pull and absorb a buffer instead and copy nothing.
    fn whiten_step(&mut self, out: &mut [u8], multiplier: u32) -> Result<usize, InfnoiseError> {
        let available = self.multiplier.remaining();
        if !available.is_empty() {
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            self.multiplier.bytes_written += n;
            return Ok(n);
        }

        if self.multiplier.num_bits > 0 {
            // More output owed from the state already absorbed.
            self.squeeze_owed()?;
        } else if let Some(decoded) = self.pull()? {
            self.absorb(&decoded, multiplier)?;
        }
        Ok(0)
    }

    /// Absorb one healthy buffer. Output is owed only once the buffer
    /// completes a block; until then its bits wait in the sponge.
    fn absorb(&mut self, decoded: &DecodedBuffer, multiplier: u32) -> Result<(), InfnoiseError> {
        let cap = self.health.config().entropy_cap(decoded.live());
        let sponge = self.sponge.as_mut().ok_or(InfnoiseError::ConditionerDisabled)?;
        let blocks = sponge.absorb_bits(decoded.bits.iter().map(|b| b.value));
        self.multiplier.entropy = self
            .multiplier
            .entropy
            .saturating_add(self.last_entropy.min(cap));
        if blocks == 0 {
            return Ok(());
        }
        let entropy = std::mem::take(&mut self.multiplier.entropy);

        if multiplier == 0 {
            // Emit no more than the measured entropy justifies.
            let bytes = (entropy / 8) as usize;
            self.multiplier.block = sponge.squeeze(bytes.min(SQUEEZE_BYTES));
            self.multiplier.bytes_written = 0;
            return Ok(());
        }

        self.multiplier.num_bits = u64::from(multiplier) * BITS_PER_MULTIPLIER;
        self.squeeze_owed()
    }

    fn squeeze_owed(&mut self) -> Result<(), InfnoiseError> {
        let sponge = self.sponge.as_mut().ok_or(InfnoiseError::ConditionerDisabled)?;
        let bytes = (self.multiplier.num_bits / 8).min(SQUEEZE_BYTES as u64);
        self.multiplier.block = sponge.squeeze(bytes as usize);
        self.multiplier.bytes_written = 0;
        self.multiplier.num_bits -= bytes * 8;
        Ok(())
    }

    /// Run one exchange through the decoder and health check.
    ///
    /// `Ok(None)` while the health check is still warming up.
    fn pull(&mut self) -> Result<Option<DecodedBuffer>, InfnoiseError> {
        let response = match self.transport.exchange(&self.request) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("exchange failed, session unusable: {e}");
                self.state = SessionState::Errored;
                return Err(e);
            }
        };

        let decoded = decode_buffer(&response);
        let verdict = self.health.check(&decoded);
        self.log_stats(&decoded, &verdict);

        match verdict {
            HealthVerdict::Healthy { entropy } => {
                self.last_entropy = entropy;
                Ok(Some(decoded))
            }
            HealthVerdict::WarmingUp => Ok(None),
            HealthVerdict::Unhealthy(failure) => {
                log::warn!("discarding buffer: {failure}");
                Err(failure.into())
            }
        }
    }

    fn log_stats(&self, decoded: &DecodedBuffer, verdict: &HealthVerdict) {
        let level = if self.debug {
            log::Level::Info
        } else {
            log::Level::Trace
        };
        let stats = self.health.stats();
        log::log!(
            level,
            "buffer {}: {}/{} live, {:?}, {:.4} bits/bit over {} bits, longest run {}",
            stats.buffers,
            decoded.live(),
            decoded.samples,
            verdict,
            stats.entropy_per_bit,
            stats.total_bits,
            stats.longest_run,
        );
    }
}

impl<T: Transport> Drop for InfNoise<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// Whitened output at multiplier 1, or raw output when the session has no
/// conditioner.
///
/// Unlike [`InfNoise::read_data`], whitened output owed from one `read`
/// carries over to the next, so `read_exact` in small chunks still takes
/// 32 bytes from every absorbed block. Raw leftover bits do not carry over.
/// A `read_data` call drops whatever is owed.
impl<T: Transport> io::Read for InfNoise<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mode = if self.has_conditioner() {
            OutputMode::Whitened { multiplier: 1 }
        } else {
            OutputMode::Raw
        };
        self.fill(buf, mode).map_err(|e| {
            self.multiplier.reset();
            io::Error::other(e)
        })
    }
}
