// Secure randomness for the draw: shuffles and audit seeds
use rand::{CryptoRng, Rng, RngCore};
use std::fmt::Write;

/// Bytes of entropy recorded as the audit seed
pub const AUDIT_SEED_LEN: usize = 32;

/// Uniform index in `[0, upper]`.
///
/// `gen_range` bounds by rejection sampling, so small ranges carry no modulo bias.
pub fn random_index<R>(rng: &mut R, upper: usize) -> usize
where
    R: RngCore + CryptoRng,
{
    rng.gen_range(0..=upper)
}

/// Fisher-Yates shuffle in place, walking from the last index down to 1.
/// Each call draws fresh values from `rng`.
pub fn secure_shuffle<T, R>(items: &mut [T], rng: &mut R)
where
    R: RngCore + CryptoRng,
{
    for i in (1..items.len()).rev() {
        let j = random_index(rng, i);
        items.swap(i, j);
    }
}

/// Independent random value logged with a draw. Never used to seed a shuffle.
pub fn generate_audit_seed<R>(rng: &mut R) -> String
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; AUDIT_SEED_LEN];
    rng.fill_bytes(&mut bytes);

    let mut hex = String::with_capacity(AUDIT_SEED_LEN * 2);
    for byte in bytes.iter() {
        // Writing to a String cannot fail
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut items: Vec<u32> = (0..50).collect();
        secure_shuffle(&mut items, &mut rng);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_shuffle_handles_tiny_slices() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut empty: Vec<u8> = vec![];
        secure_shuffle(&mut empty, &mut rng);
        assert!(empty.is_empty());

        let mut single = vec![9];
        secure_shuffle(&mut single, &mut rng);
        assert_eq!(single, vec![9]);
    }

    #[test]
    fn test_consecutive_shuffles_use_fresh_randomness() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut first: Vec<u32> = (0..30).collect();
        let mut second = first.clone();
        secure_shuffle(&mut first, &mut rng);
        secure_shuffle(&mut second, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_shuffle_positions_are_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut first_slot = [0u32; 4];
        for _ in 0..8000 {
            let mut items = [0usize, 1, 2, 3];
            secure_shuffle(&mut items, &mut rng);
            first_slot[items[0]] += 1;
        }
        // Expected 2000 each
        for count in first_slot.iter() {
            assert!(*count > 1700 && *count < 2300, "skewed: {:?}", first_slot);
        }
    }

    #[test]
    fn test_audit_seed_is_hex() {
        let mut rng = StdRng::seed_from_u64(3);
        let seed = generate_audit_seed(&mut rng);
        assert_eq!(seed.len(), AUDIT_SEED_LEN * 2);
        assert!(seed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(seed, generate_audit_seed(&mut rng));
    }

    #[test]
    fn test_random_index_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        for upper in 0..20 {
            for _ in 0..50 {
                assert!(random_index(&mut rng, upper) <= upper);
            }
        }
    }
}
