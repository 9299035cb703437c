use rand::{rngs::OsRng, Rng};

pub const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Characters used for generated one-time passwords.
pub const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_=+";

/// `len` characters drawn uniformly from `charset` using the OS CSPRNG.
pub fn random_string(len: usize, charset: &[u8]) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_from_charset() {
        let s = random_string(24, ALPHANUMERIC);
        assert_eq!(s.len(), 24);
        assert!(s.bytes().all(|b| ALPHANUMERIC.contains(&b)));
    }

    #[test]
    fn values_differ() {
        assert_ne!(random_string(24, ALPHANUMERIC), random_string(24, ALPHANUMERIC));
    }
}
