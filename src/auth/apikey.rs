use rand::Rng;

const KEY_PREFIX: &str = "fsk";
const SECRET_BYTES: usize = 16;

/// Number of leading characters of a raw key that are safe to display.
pub const KEY_PREFIX_LENGTH: usize = 8;

/// Generates a new raw API key with the format: fsk_<32 hex chars>.
/// The full value is shown exactly once, at creation time.
#[must_use]
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    format!("{KEY_PREFIX}_{}", hex::encode(&bytes))
}

/// The display prefix of a raw key, used everywhere the key is listed.
#[must_use]
pub fn key_prefix(raw_key: &str) -> &str {
    &raw_key[..raw_key.len().min(KEY_PREFIX_LENGTH)]
}

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0x0f) as usize] as char);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = generate_api_key();

        assert!(key.starts_with("fsk_"));
        assert_eq!(key.len(), 4 + SECRET_BYTES * 2);
        assert!(key[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_keys_are_unique() {
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn test_key_prefix_length() {
        let key = generate_api_key();
        let prefix = key_prefix(&key);

        assert_eq!(prefix.len(), KEY_PREFIX_LENGTH);
        assert!(key.starts_with(prefix));
    }

    #[test]
    fn test_key_prefix_of_short_input() {
        assert_eq!(key_prefix("fsk"), "fsk");
    }
}
