//! Source of randomness for room codes, nicknames, avatars and role draws.

use std::sync::Mutex;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Characters room codes are drawn from.
pub const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 5;

const COLORS: &[&str] = &[
    "Red", "Blue", "Green", "Yellow", "Purple", "Orange", "Pink", "Teal", "Silver", "Golden",
];
const ADJECTIVES: &[&str] = &[
    "Sneaky", "Brave", "Sleepy", "Clever", "Fluffy", "Grumpy", "Happy", "Jolly", "Lucky", "Swift",
];
const ANIMALS: &[&str] = &[
    "Fox", "Otter", "Panda", "Badger", "Falcon", "Koala", "Lynx", "Moose", "Owl", "Walrus",
];

/// Uniform random draws. Implementations only provide [`Randomizer::below`].
pub trait Randomizer: Send + Sync {
    /// Uniform integer in `0..upper`; `upper` is never zero.
    fn below(&self, upper: usize) -> usize;

    /// Uniform index into a slice of `len` elements, `None` when empty.
    fn index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.below(len))
    }

    /// Five characters drawn uniformly from [`ROOM_CODE_CHARSET`].
    fn room_code(&self) -> String {
        (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_CHARSET[self.below(ROOM_CODE_CHARSET.len())] as char)
            .collect()
    }

    /// Nickname made of a color, an adjective and an animal.
    fn nickname(&self) -> String {
        format!(
            "{}{}{}",
            COLORS[self.below(COLORS.len())],
            ADJECTIVES[self.below(ADJECTIVES.len())],
            ANIMALS[self.below(ANIMALS.len())]
        )
    }

    /// Seed for a freshly generated avatar.
    fn avatar_seed(&self) -> u64 {
        (0..4).fold(0u64, |acc, _| (acc << 16) | self.below(1 << 16) as u64)
    }
}

/// Thread-local generator used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandomizer;

impl Randomizer for ThreadRandomizer {
    fn below(&self, upper: usize) -> usize {
        rand::rng().random_range(0..upper)
    }
}

/// Deterministic generator for tests.
#[derive(Debug)]
pub struct SeededRandomizer {
    rng: Mutex<StdRng>,
}

impl SeededRandomizer {
    /// Generator producing the same sequence for the same seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Randomizer for SeededRandomizer {
    fn below(&self, upper: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..upper),
            Err(poisoned) => poisoned.into_inner().random_range(0..upper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_use_the_charset() {
        let randomizer = ThreadRandomizer;
        for _ in 0..100 {
            let code = randomizer.room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|b| ROOM_CODE_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn seeded_sequences_repeat() {
        let a = SeededRandomizer::new(7);
        let b = SeededRandomizer::new(7);
        assert_eq!(a.room_code(), b.room_code());
        assert_eq!(a.nickname(), b.nickname());
        assert_eq!(a.avatar_seed(), b.avatar_seed());
    }

    #[test]
    fn nicknames_fit_the_length_limit() {
        let randomizer = SeededRandomizer::new(1);
        for _ in 0..50 {
            let nickname = randomizer.nickname();
            assert!((1..=30).contains(&nickname.chars().count()));
        }
    }

    #[test]
    fn index_of_empty_slice_is_none() {
        assert_eq!(ThreadRandomizer.index(0), None);
        assert!(ThreadRandomizer.index(3).is_some_and(|i| i < 3));
    }
}
