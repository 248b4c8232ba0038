#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod group;

/// The open-addressing table.
///
/// This module provides [`HashTable`], its iterators, and (with the `stats`
/// feature) the inspection types it reports.
pub mod hash_table;

/// The reduced-round SipHash used to hash every key.
pub mod hasher;

/// Key encodings and identity-hashed keys.
pub mod key;

pub use hash_table::HashTable;
pub use hasher::SipHasher13;
pub use key::IdentityKey;
pub use key::TableKey;
