use core::hash::Hasher;

/// Internal SipHash state words.
#[derive(Debug, Clone, Copy)]
struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl State {
    #[inline(always)]
    fn compress(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(13) ^ self.v0;
        self.v3 = self.v3.rotate_left(16) ^ self.v2;
        self.v0 = self.v0.rotate_left(32);

        self.v2 = self.v2.wrapping_add(self.v1);
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(17) ^ self.v2;
        self.v3 = self.v3.rotate_left(21) ^ self.v0;
        self.v2 = self.v2.rotate_left(32);
    }

    #[inline(always)]
    fn c_rounds(&mut self) {
        self.compress();
    }

    #[inline(always)]
    fn d_rounds(&mut self) {
        self.compress();
        self.compress();
        self.compress();
    }

    #[inline(always)]
    fn absorb(&mut self, block: u64) {
        self.v3 ^= block;
        self.c_rounds();
        self.v0 ^= block;
    }
}

/// Loads up to 7 bytes of `buf[start..start + len]` as a little-endian
/// integer.
#[inline(always)]
fn u8to64_le(buf: &[u8], start: usize, len: usize) -> u64 {
    debug_assert!(len < 8);
    let mut out = 0u64;
    for (i, byte) in buf[start..start + len].iter().enumerate() {
        out |= (*byte as u64) << (i * 8);
    }
    out
}

/// A reduced-round SipHash (one compression round per block, three
/// finalization rounds).
///
/// This is the hasher every [`TableKey`](crate::TableKey) encodes into. It is
/// fast and statistically well distributed, but it makes no cryptographic
/// promises. The table always uses the fixed keys of [`SipHasher13::new`].
///
/// Input may be fed in arbitrary chunks: a partial trailing block is buffered
/// across `write` calls, so `write(b"ab"); write(b"c")` hashes the same as
/// `write(b"abc")`.
///
/// # Examples
///
/// ```rust
/// use core::hash::Hasher;
///
/// use group_hash::SipHasher13;
///
/// let mut a = SipHasher13::new();
/// a.write(b"hello ");
/// a.write(b"world");
///
/// let mut b = SipHasher13::new();
/// b.write(b"hello world");
///
/// assert_eq!(a.finish(), b.finish());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SipHasher13 {
    k0: u64,
    k1: u64,
    length: usize,
    state: State,
    tail: u64,
    ntail: usize,
}

impl Default for SipHasher13 {
    fn default() -> Self {
        Self::new()
    }
}

impl SipHasher13 {
    /// Creates a hasher keyed with `k0 = k1 = 0`.
    pub const fn new() -> Self {
        Self::new_with_keys(0, 0)
    }

    /// Creates a hasher keyed with the provided keys.
    pub const fn new_with_keys(k0: u64, k1: u64) -> Self {
        Self {
            k0,
            k1,
            length: 0,
            state: State {
                v0: k0 ^ 0x736f_6d65_7073_6575,
                v1: k1 ^ 0x646f_7261_6e64_6f6d,
                v2: k0 ^ 0x6c79_6765_6e65_7261,
                v3: k1 ^ 0x7465_6462_7974_6573,
            },
            tail: 0,
            ntail: 0,
        }
    }

    /// Returns the keys this hasher was created with.
    pub const fn keys(&self) -> (u64, u64) {
        (self.k0, self.k1)
    }

    /// Resets the hasher to its freshly-keyed state.
    pub fn reset(&mut self) {
        *self = Self::new_with_keys(self.k0, self.k1);
    }
}

impl Hasher for SipHasher13 {
    #[inline]
    fn write(&mut self, msg: &[u8]) {
        let length = msg.len();
        self.length = self.length.wrapping_add(length);

        let mut needed = 0;
        if self.ntail != 0 {
            needed = 8 - self.ntail;
            self.tail |= u8to64_le(msg, 0, length.min(needed)) << (8 * self.ntail);
            if length < needed {
                self.ntail += length;
                return;
            }

            self.state.absorb(self.tail);
            self.ntail = 0;
        }

        let left = (length - needed) & 0x7;
        let end = length - left;
        let mut i = needed;
        while i < end {
            let mut block = [0u8; 8];
            block.copy_from_slice(&msg[i..i + 8]);
            self.state.absorb(u64::from_le_bytes(block));
            i += 8;
        }

        self.tail = u8to64_le(msg, i, left);
        self.ntail = left;
    }

    #[inline]
    fn finish(&self) -> u64 {
        let mut state = self.state;

        let b = ((self.length as u64 & 0xff) << 56) | self.tail;
        state.absorb(b);

        state.v2 ^= 0xff;
        state.d_rounds();

        state.v0 ^ state.v1 ^ state.v2 ^ state.v3
    }
}
