use bytes::Bytes;

/// A compact per-piece presence set.
///
/// Bit `i` is the `(i mod 8)`-th most significant bit of byte `i / 8`.
/// Spare bits past the piece count are kept zero.
#[derive(Debug, Clone)]
pub struct Bitfield {
    bits: Vec<u8>,
    pieces: usize,
}

impl Bitfield {
    /// Creates an empty bitfield for `pieces` pieces.
    pub fn new(pieces: usize) -> Self {
        Self {
            bits: vec![0; pieces.div_ceil(8)],
            pieces,
        }
    }

    /// Creates a bitfield from wire bytes, truncating or zero-extending to
    /// the expected size and masking spare bits.
    pub fn from_bytes(bytes: &[u8], pieces: usize) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(pieces.div_ceil(8), 0);
        let mut bf = Self { bits, pieces };
        bf.mask_spare_bits();
        bf
    }

    /// Creates a full bitfield.
    pub fn full(pieces: usize) -> Self {
        let mut bf = Self {
            bits: vec![0xFF; pieces.div_ceil(8)],
            pieces,
        };
        bf.mask_spare_bits();
        bf
    }

    /// Returns true if piece `index` is present.
    pub fn has(&self, index: usize) -> bool {
        if index >= self.pieces {
            return false;
        }
        (self.bits[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// Marks piece `index` as present.
    pub fn set(&mut self, index: usize) {
        if index < self.pieces {
            self.bits[index / 8] |= 1 << (7 - index % 8);
        }
    }

    /// Number of present pieces.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// True when every piece is present.
    pub fn is_complete(&self) -> bool {
        self.count() == self.pieces
    }

    /// True when no piece is present.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Indices of absent pieces, in order.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.pieces)
            .filter(|&i| !self.has(i))
            .map(|i| i as u32)
            .collect()
    }

    /// Total number of pieces tracked.
    pub fn len(&self) -> usize {
        self.pieces
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    fn mask_spare_bits(&mut self) {
        let spare = self.bits.len() * 8 - self.pieces;
        if spare > 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= 0xFFu8 << spare;
            }
        }
    }
}
