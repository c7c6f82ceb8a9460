//! Seeded Random Number Generator
//!
//! Xorshift128+ PRNG used for dice rolls and deck shuffling. Every
//! session owns one instance seeded at creation, so a session's
//! random sequence is reproducible from its seed, so replays and
//! tests get identical dice and identical shuffles.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seeded PRNG using the Xorshift128+ algorithm.
///
/// Given the same seed, produces the exact same sequence on any
/// platform.
///
/// # Example
///
/// ```
/// use tabletop_arena::game::rng::GameRng;
///
/// let mut rng = GameRng::new(12345);
/// let roll = rng.roll_die();
/// assert!((1..=6).contains(&roll));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    state: [u64; 2],
}

impl Default for GameRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl GameRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Roll a single six-sided die (1..=6).
    #[inline]
    pub fn roll_die(&mut self) -> u8 {
        (self.next_int(6) + 1) as u8
    }

    /// Roll two independent six-sided dice.
    #[inline]
    pub fn roll_dice_pair(&mut self) -> (u8, u8) {
        (self.roll_die(), self.roll_die())
    }

    /// Shuffle a slice in place using Fisher-Yates.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Get current state (for snapshotting).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a session seed from the session id and the joined players.
///
/// A session seeded this way cannot be steered by any single player:
/// the id is server-assigned and the player set is sorted before
/// hashing.
pub fn derive_session_seed(session_id: &[u8; 16], player_ids: &[[u8; 16]]) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"TABLETOP_ARENA_SEED_V1");
    hasher.update(session_id);

    let mut sorted: Vec<[u8; 16]> = player_ids.to_vec();
    sorted.sort_unstable();
    for pid in &sorted {
        hasher.update(pid);
    }

    let hash = hasher.finalize();
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = GameRng::new(12345);
        let mut rng2 = GameRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_roll_die_range() {
        let mut rng = GameRng::new(42);
        for _ in 0..1000 {
            let roll = rng.roll_die();
            assert!((1..=6).contains(&roll));
        }
    }

    #[test]
    fn test_roll_die_covers_all_faces() {
        let mut rng = GameRng::new(7);
        let mut seen = [false; 6];
        for _ in 0..200 {
            seen[(rng.roll_die() - 1) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_shuffle_determinism() {
        let mut rng1 = GameRng::new(1111);
        let mut rng2 = GameRng::new(1111);

        let mut arr1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut arr2 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        rng1.shuffle(&mut arr1);
        rng2.shuffle(&mut arr2);

        assert_eq!(arr1, arr2);
    }

    #[test]
    fn test_shuffle_preserves_elements() {
        let mut rng = GameRng::new(99);
        let mut arr: Vec<u32> = (0..52).collect();
        rng.shuffle(&mut arr);
        let mut sorted = arr.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..52).collect::<Vec<u32>>());
    }

    #[test]
    fn test_derive_session_seed_order_independent() {
        let session = [1u8; 16];
        let a = [2u8; 16];
        let b = [3u8; 16];

        let seed1 = derive_session_seed(&session, &[a, b]);
        let seed2 = derive_session_seed(&session, &[b, a]);
        assert_eq!(seed1, seed2);

        let other = derive_session_seed(&[9u8; 16], &[a, b]);
        assert_ne!(seed1, other);
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = GameRng::new(5555);
        for _ in 0..50 {
            rng.next_u64();
        }

        let saved = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved);
        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }
}
