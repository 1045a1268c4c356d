//! FT240X bit-bang sample format: constants, request pattern, debiasing.
//!
//! Pure functions with no I/O, reusable with any transport.

// --- USB identification ---
pub const FTDI_VENDOR_ID: u16 = 0x0403;
pub const FT240X_PRODUCT_ID: u16 = 0x6015;

/// Bytes per exchange. The FT240X FIFO holds 512 bytes, and one buffer of
/// decoded bits (512 bits) fits in a single Keccak-1600 absorb.
pub const BUFLEN: usize = 512;

// --- Pin assignment (bit positions within each sample byte) ---
pub const COMP1: u8 = 1;
pub const COMP2: u8 = 4;
pub const SWEN1: u8 = 2;
pub const SWEN2: u8 = 0;

/// Clock phase pins, echoed back in every live sample.
pub const CLOCK_MASK: u8 = (1 << SWEN1) | (1 << SWEN2);

/// Clock byte driven for sample `index`: SWEN2 on odd samples, SWEN1 on even.
pub fn clock_phase(index: usize) -> u8 {
    if index & 1 == 1 {
        1 << SWEN2
    } else {
        1 << SWEN1
    }
}

/// Build the request buffer that clocks the multiplier through `BUFLEN`
/// alternating phases.
pub fn request_buffer() -> [u8; BUFLEN] {
    let mut buf = [0u8; BUFLEN];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = clock_phase(i);
    }
    buf
}

/// One debiased output bit and the phase it was sampled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseBit {
    pub value: bool,
    /// Sampled during an odd (SWEN2) phase, read from COMP2.
    pub odd: bool,
}

/// Result of decoding one response buffer.
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    /// Bits from live samples, in sample order.
    pub bits: Vec<NoiseBit>,
    /// Samples in the buffer, live or not.
    pub samples: usize,
}

impl DecodedBuffer {
    /// Samples whose echoed clock matched the driven phase.
    pub fn live(&self) -> usize {
        self.bits.len()
    }

    pub fn live_fraction(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.live() as f64 / self.samples as f64
    }
}

/// Decode one response buffer into debiased bits.
///
/// Each phase leaves the fresh bit on one comparator only, so odd samples
/// take COMP2 and even samples take COMP1. Alternating comparators cancels
/// the offset between the two multiplier halves. Samples whose clock echo
/// does not match the driven phase are dropped, never zero-filled.
pub fn decode_buffer(buf: &[u8; BUFLEN]) -> DecodedBuffer {
    let mut bits = Vec::with_capacity(BUFLEN);
    for (i, &sample) in buf.iter().enumerate() {
        if sample & CLOCK_MASK != clock_phase(i) {
            continue;
        }
        let odd = i & 1 == 1;
        let pin = if odd { COMP2 } else { COMP1 };
        bits.push(NoiseBit {
            value: (sample >> pin) & 1 != 0,
            odd,
        });
    }
    DecodedBuffer {
        bits,
        samples: BUFLEN,
    }
}

/// MSB-first bit accumulator.
#[derive(Debug, Clone, Default)]
pub struct BitPacker {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitPacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bit: bool) {
        let shift = self.bits % 8;
        if shift == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 0x80 >> shift;
            }
        }
        self.bits += 1;
    }

    pub fn extend<I: IntoIterator<Item = bool>>(&mut self, bits: I) {
        for bit in bits {
            self.push(bit);
        }
    }

    /// Bits held, including a trailing partial byte.
    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn complete_bytes(&self) -> usize {
        self.bits / 8
    }

    /// Remove up to `n` complete bytes from the front.
    pub fn drain_bytes(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.complete_bytes());
        self.bits -= n * 8;
        self.bytes.drain(..n).collect()
    }
}
