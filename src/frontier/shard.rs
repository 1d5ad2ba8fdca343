//! Consistent domain→shard hashing.
//!
//! Must be stable across processes and across runs, so it cannot use a
//! language-default string hash (which randomizes per process): `md5`
//! pinned and deterministic.

use md5::{Digest, Md5};

/// `md5(domain)[0..8]` as a big-endian u64, mod `shard_count`.
pub fn shard_for(domain: &str, shard_count: u64) -> u64 {
    let digest = Md5::digest(domain.as_bytes());
    let high8: [u8; 8] = digest[0..8].try_into().expect("md5 digest is 16 bytes");
    u64::from_be_bytes(high8) % shard_count.max(1)
}

/// Two-hex-char directory bucket for `<data_dir>/frontiers/<xx>/`, derived
/// from the same hash so related domains land in the same neighborhood.
pub fn directory_bucket(domain: &str) -> String {
    let digest = Md5::digest(domain.as_bytes());
    hex::encode(&digest[0..1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_stable_across_calls() {
        let a = shard_for("example.com", 4);
        let b = shard_for("example.com", 4);
        assert_eq!(a, b);
    }

    #[test]
    fn shard_is_within_range() {
        for domain in ["a.com", "b.com", "c.com", "d.com", "example.org"] {
            let shard = shard_for(domain, 5);
            assert!(shard < 5);
        }
    }

    #[test]
    fn single_shard_always_zero() {
        assert_eq!(shard_for("anything.com", 1), 0);
    }

    #[test]
    fn directory_bucket_is_two_hex_chars() {
        let bucket = directory_bucket("example.com");
        assert_eq!(bucket.len(), 2);
        assert!(bucket.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn directory_bucket_is_stable() {
        assert_eq!(directory_bucket("example.com"), directory_bucket("example.com"));
    }
}
