/// A packed bit sequence over the source table.
///
/// Bit `i` lives in byte `i / 8` at mask `0x80 >> (i % 8)` (big-endian within
/// bytes). Equality and hashing are over the raw bytes, which is what makes
/// byte-identical coverage bitmaps group commits together.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// An all-zeros bitmap wide enough for `nbits` bits.
    pub fn zeros(nbits: usize) -> Self {
        Self {
            bytes: vec![0u8; nbits.div_ceil(8)],
        }
    }

    /// An all-ones bitmap over bits `0..nbits`; the padding bits of the
    /// trailing byte stay zero.
    pub fn ones(nbits: usize) -> Self {
        let mut bytes = vec![0xffu8; nbits.div_ceil(8)];
        let extra = nbits % 8;
        if extra != 0 {
            if let Some(last) = bytes.last_mut() {
                *last = 0xffu8 << (8 - extra);
            }
        }
        Self { bytes }
    }

    /// Reconstruct from raw bytes (cache deserialization).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Set bit `i`.
    pub fn set(&mut self, i: usize) {
        self.bytes[i / 8] |= 0x80 >> (i % 8);
    }

    /// Read bit `i`. Bits beyond the byte array are zero.
    pub fn get(&self, i: usize) -> bool {
        match self.bytes.get(i / 8) {
            Some(byte) => byte & (0x80 >> (i % 8)) != 0,
            None => false,
        }
    }

    /// In-place OR of an equally sized bitmap.
    pub fn or_assign(&mut self, other: &Bitmap) {
        debug_assert_eq!(self.bytes.len(), other.bytes.len());
        for (dst, src) in self.bytes.iter_mut().zip(&other.bytes) {
            *dst |= src;
        }
    }

    /// OR `src` into this bitmap starting at `byte_offset`. Used by
    /// step-sliced propagation to land a partial bitmap at its offset.
    pub fn or_bytes_at(&mut self, byte_offset: usize, src: &[u8]) {
        debug_assert!(byte_offset + src.len() <= self.bytes.len());
        for (dst, s) in self.bytes[byte_offset..].iter_mut().zip(src) {
            *dst |= s;
        }
    }

    /// `self AND other` as a new bitmap.
    pub fn and(&self, other: &Bitmap) -> Bitmap {
        debug_assert_eq!(self.bytes.len(), other.bytes.len());
        Bitmap {
            bytes: self
                .bytes
                .iter()
                .zip(&other.bytes)
                .map(|(a, b)| a & b)
                .collect(),
        }
    }

    /// `popcount(self AND other)` without allocating.
    pub fn and_count(&self, other: &Bitmap) -> usize {
        self.bytes
            .iter()
            .zip(&other.bytes)
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    /// In-place `self &= !other` (mask out the other bitmap's bits).
    pub fn and_not_assign(&mut self, other: &Bitmap) {
        debug_assert_eq!(self.bytes.len(), other.bytes.len());
        for (dst, src) in self.bytes.iter_mut().zip(&other.bytes) {
            *dst &= !src;
        }
    }

    /// Population count.
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Indices of set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bytes.iter().enumerate().flat_map(|(byte_idx, &byte)| {
            (0..8).filter_map(move |bit| {
                if byte & (0x80 >> bit) != 0 {
                    Some(byte_idx * 8 + bit)
                } else {
                    None
                }
            })
        })
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitmap[{} bytes,", self.bytes.len())?;
        let ones: Vec<usize> = self.iter_ones().collect();
        write!(f, " ones={ones:?}]")
    }
}
