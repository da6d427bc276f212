//! Short random identifiers for scheduled jobs.

use rand::Rng;

/// Uppercase letters and digits only; 36^5 is roughly 6x10^7 ids, so a
/// collision against a tenant's handful of jobs is vanishingly rare.
pub const JOB_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const JOB_ID_LEN: usize = 5;

/// Insert attempts are bounded rather than looped forever: after this
/// many collisions the create fails fatally.
pub const MAX_JOB_ID_ATTEMPTS: usize = 3;

pub fn generate_job_id<R: Rng>(rng: &mut R) -> String {
    (0..JOB_ID_LEN)
        .map(|_| {
            let index = rng.gen_range(0..JOB_ID_ALPHABET.len());
            JOB_ID_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{generate_job_id, JOB_ID_ALPHABET, JOB_ID_LEN};

    #[test]
    fn generated_ids_use_only_the_declared_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..256 {
            let id = generate_job_id(&mut rng);
            assert_eq!(id.len(), JOB_ID_LEN);
            assert!(id.bytes().all(|byte| JOB_ID_ALPHABET.contains(&byte)), "unexpected id {id}");
        }
    }

    #[test]
    fn consecutive_ids_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = generate_job_id(&mut rng);
        let second = generate_job_id(&mut rng);
        assert_ne!(first, second);
    }
}
