//! Id assignment strategies.

use std::num::NonZeroUsize;

use rand::Rng;

use super::record::IdKind;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const DEFAULT_TOKEN_LENGTH: NonZeroUsize = NonZeroUsize::new(8).unwrap();

/// Draws allowed per create when random ids are verified unique.
pub const MAX_ID_DRAWS: usize = 32;

/// How a collection names new records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdStrategy {
    /// A short lowercase base-36 token. Assumed unique; checked against the
    /// collection only when `verify_unique` is set, giving up after
    /// [`MAX_ID_DRAWS`] collisions.
    Random { length: NonZeroUsize, verify_unique: bool },

    /// The last issued number, persisted under `key` next to the collection.
    Counter { key: String },
}

impl IdStrategy {
    pub fn random() -> Self {
        Self::Random { length: DEFAULT_TOKEN_LENGTH, verify_unique: false }
    }

    pub fn counter(key: impl Into<String>) -> Self {
        Self::Counter { key: key.into() }
    }

    pub fn kind(&self) -> IdKind {
        match self {
            Self::Random { .. } => IdKind::Text,
            Self::Counter { .. } => IdKind::Numeric,
        }
    }
}

pub fn random_token(length: NonZeroUsize) -> String {
    let mut rng = rand::thread_rng();
    (0..length.get())
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
