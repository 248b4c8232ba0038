use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::fmt::Debug;
use core::hash::Hasher;
use core::ops::Deref;

use crate::hasher::SipHasher13;

/// Byte appended after variable-length text so that no encoding is a prefix
/// of another. `0xFF` never occurs in UTF-8.
const TEXT_TERMINATOR: u8 = 0xFF;

/// Number of random bytes hashed to produce an identity salt.
const SALT_LEN: usize = 32;

/// A key that can be stored in a [`HashTable`](crate::HashTable).
///
/// Implementors describe how to feed themselves into the table's
/// [`SipHasher13`]. Two keys that compare equal must produce identical
/// encodings, and borrowed forms (`str` for `String`, for example) must encode
/// exactly like their owned counterparts so that lookups through
/// [`Borrow`](core::borrow::Borrow) find the stored entry.
///
/// # Examples
///
/// ```rust
/// use group_hash::HashTable;
/// use group_hash::SipHasher13;
/// use group_hash::TableKey;
///
/// #[derive(PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl TableKey for Point {
///     fn encode(&self, hasher: &mut SipHasher13) {
///         self.x.encode(hasher);
///         self.y.encode(hasher);
///     }
/// }
///
/// let mut table = HashTable::new();
/// table.insert(Point { x: 1, y: 2 }, "a");
/// assert_eq!(table.get(&Point { x: 1, y: 2 }), Some(&"a"));
/// ```
pub trait TableKey: PartialEq {
    /// Writes the key's byte representation into `hasher`.
    fn encode(&self, hasher: &mut SipHasher13);

    /// Returns the 64-bit hash the table uses for this key.
    #[inline]
    fn table_hash(&self) -> u64 {
        let mut hasher = SipHasher13::new();
        self.encode(&mut hasher);
        hasher.finish()
    }
}

impl TableKey for str {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        hasher.write(self.as_bytes());
        hasher.write(&[TEXT_TERMINATOR]);
    }
}

impl TableKey for String {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        self.as_str().encode(hasher);
    }
}

impl TableKey for Box<str> {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        (**self).encode(hasher);
    }
}

impl TableKey for char {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        let mut buf = [0u8; 4];
        self.encode_utf8(&mut buf).encode(hasher);
    }
}

impl TableKey for f64 {
    /// Encodes the IEEE-754 bit pattern. Equality follows `==`, so a `NaN`
    /// key can be inserted but never found again.
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        hasher.write(&self.to_le_bytes());
    }
}

impl TableKey for f32 {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        (*self as f64).encode(hasher);
    }
}

macro_rules! integer_keys {
    ($($ty:ty => $wide:ty),* $(,)?) => {
        $(
            impl TableKey for $ty {
                #[inline]
                fn encode(&self, hasher: &mut SipHasher13) {
                    hasher.write(&(*self as $wide).to_le_bytes());
                }
            }
        )*
    };
}

integer_keys! {
    i8 => i64,
    i16 => i64,
    i32 => i64,
    i64 => i64,
    isize => i64,
    u8 => u64,
    u16 => u64,
    u32 => u64,
    u64 => u64,
    usize => u64,
}

impl TableKey for bool {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        hasher.write(&[*self as u8]);
    }
}

impl TableKey for () {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        hasher.write(&[0]);
    }
}

impl<K: TableKey> TableKey for Option<K> {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        match self {
            Some(key) => key.encode(hasher),
            None => ().encode(hasher),
        }
    }

    #[inline]
    fn table_hash(&self) -> u64 {
        match self {
            Some(key) => key.table_hash(),
            None => ().table_hash(),
        }
    }
}

impl<K: TableKey + ?Sized> TableKey for &K {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        (**self).encode(hasher);
    }

    #[inline]
    fn table_hash(&self) -> u64 {
        (**self).table_hash()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        fn fill_salt(buf: &mut [u8; SALT_LEN]) {
            use core::cell::RefCell;

            use rand::RngCore;
            use rand::SeedableRng;
            use rand::rngs::SmallRng;

            std::thread_local! {
                static SALT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
            }

            SALT_RNG.with(|rng| rng.borrow_mut().fill_bytes(buf));
        }
    } else {
        fn fill_salt(buf: &mut [u8; SALT_LEN]) {
            use rand::TryRngCore;
            use rand::rngs::OsRng;

            OsRng
                .try_fill_bytes(buf)
                .expect("operating system randomness unavailable for identity salt");
        }
    }
}

fn identity_salt() -> u64 {
    let mut salt = [0u8; SALT_LEN];
    fill_salt(&mut salt);

    let mut hasher = SipHasher13::new();
    hasher.write(&salt);
    hasher.finish()
}

struct Salted<T: ?Sized> {
    hash: u64,
    value: T,
}

/// A key compared and hashed by identity rather than by content.
///
/// `IdentityKey` is a reference-counted handle. Its allocation carries a hash
/// derived from random bytes drawn once, at construction. Clones share the
/// allocation and therefore the hash; two separately constructed keys are
/// never equal, even when their contents are.
///
/// Hashing an `IdentityKey` never touches its contents, so it is O(1) no
/// matter how large `T` is.
///
/// # Examples
///
/// ```rust
/// use group_hash::HashTable;
/// use group_hash::IdentityKey;
///
/// let a = IdentityKey::new(vec![1, 2, 3]);
/// let b = IdentityKey::new(vec![1, 2, 3]);
///
/// let mut table = HashTable::new();
/// table.insert(a.clone(), "a");
///
/// assert_eq!(table.get(&a), Some(&"a"));
/// assert_eq!(table.get(&b), None);
/// assert_eq!(*b, vec![1, 2, 3]);
/// ```
pub struct IdentityKey<T: ?Sized> {
    inner: Rc<Salted<T>>,
}

impl<T> IdentityKey<T> {
    /// Wraps `value` in a new identity with a freshly drawn salt.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Salted {
                hash: identity_salt(),
                value,
            }),
        }
    }
}

impl<T: ?Sized> IdentityKey<T> {
    /// Returns `true` if both handles refer to the same identity.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }

    /// Returns the cached identity hash.
    pub fn salt(&self) -> u64 {
        self.inner.hash
    }
}

impl<T: ?Sized> Clone for IdentityKey<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Deref for IdentityKey<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: ?Sized> PartialEq for IdentityKey<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for IdentityKey<T> {}

impl<T: Debug + ?Sized> Debug for IdentityKey<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityKey")
            .field("salt", &format_args!("{:016x}", self.inner.hash))
            .field("value", &&self.inner.value)
            .finish()
    }
}

impl<T: ?Sized> TableKey for IdentityKey<T> {
    #[inline]
    fn encode(&self, hasher: &mut SipHasher13) {
        hasher.write(&self.inner.hash.to_le_bytes());
    }

    #[inline]
    fn table_hash(&self) -> u64 {
        self.inner.hash
    }
}
