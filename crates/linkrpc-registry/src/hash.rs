use md5::{Digest, Md5};

/// Derive a function (or topic) id from its registered name.
///
/// Takes the first four bytes of the MD5 digest of `name` and reads them as a
/// little-endian `u32`. This does not reproduce the original C++
/// implementation's internal 32-bit MD5 folding bit-for-bit; it only needs to
/// be a stable, collision-resistant function of `name` that client and server
/// agree on, which a truncated digest gives for free.
pub fn hash32(name: &str) -> u32 {
    let digest = Md5::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        assert_eq!(hash32("add"), hash32("add"));
    }

    #[test]
    fn differs_for_different_names() {
        assert_ne!(hash32("add"), hash32("subtract"));
    }
}
