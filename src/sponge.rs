//! Keccak-f[1600] sponge used to condition debiased bits.
//!
//! Absorb blocks are 8 lanes (512 bits), so one healthy buffer of decoded
//! bits fills exactly one block. Squeeze blocks are 16 lanes (1024 bits).
//! The state is permuted once after every absorbed block and once after
//! every squeezed block.

use crate::protocol::BitPacker;

/// Bytes XORed into the state per absorb permutation.
pub const ABSORB_BYTES: usize = 64;
/// Maximum bytes extracted per squeeze permutation.
pub const SQUEEZE_BYTES: usize = 128;

const LANES: usize = 25;

/// Keccak sponge conditioner.
///
/// Squeezed output depends only on the ordered bits absorbed since
/// construction, not on how they were split across calls. Bits that do not
/// yet fill a block stay pending until the next absorb.
pub struct Sponge {
    state: [u64; LANES],
    pending: BitPacker,
}

impl Sponge {
    /// Fresh all-zero state.
    pub fn new() -> Self {
        Self {
            state: [0; LANES],
            pending: BitPacker::new(),
        }
    }

    /// Queue `bits` and mix in every complete block. Returns the number of
    /// blocks permuted into the state, zero if the bits are all still pending.
    pub fn absorb_bits<I: IntoIterator<Item = bool>>(&mut self, bits: I) -> usize {
        self.pending.extend(bits);
        let mut blocks = 0;
        while self.pending.complete_bytes() >= ABSORB_BYTES {
            let block = self.pending.drain_bytes(ABSORB_BYTES);
            self.absorb_block(&block);
            blocks += 1;
        }
        blocks
    }

    /// Absorb whole bytes, most significant bit first.
    pub fn absorb_bytes(&mut self, bytes: &[u8]) -> usize {
        self.absorb_bits(
            bytes
                .iter()
                .flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1 != 0)),
        )
    }

    /// Bits absorbed but not yet mixed into the state.
    pub fn pending_bits(&self) -> usize {
        self.pending.len()
    }

    /// Fill `out` from the state, permuting after each block of at most
    /// [`SQUEEZE_BYTES`].
    pub fn squeeze_into(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(SQUEEZE_BYTES) {
            for (i, byte) in chunk.iter_mut().enumerate() {
                *byte = (self.state[i / 8] >> (8 * (i % 8))) as u8;
            }
            keccak::f1600(&mut self.state);
        }
    }

    pub fn squeeze(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.squeeze_into(&mut out);
        out
    }

    fn absorb_block(&mut self, block: &[u8]) {
        for (lane, chunk) in self.state.iter_mut().zip(block.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *lane ^= u64::from_le_bytes(word);
        }
        keccak::f1600(&mut self.state);
    }
}

impl Default for Sponge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sponge {
    // Never print the state.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sponge")
            .field("pending_bits", &self.pending.len())
            .finish_non_exhaustive()
    }
}
