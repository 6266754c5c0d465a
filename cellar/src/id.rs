//! Container identifier generation.

use rand::Rng;

/// Generates a fresh 12-hex-digit container id from 6 random bytes.
pub fn generate_container_id() -> String {
    let bytes: [u8; 6] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Returns the first 6 hex characters of a container id, used as the veth
/// name suffix (`veth0_<cid6>` / `veth1_<cid6>`).
pub fn short6(cid: &str) -> &str {
    &cid[..cid.len().min(6)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_is_twelve_lowercase_hex_chars() {
        let id = generate_container_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn short6_takes_first_six_chars() {
        assert_eq!(short6("abcdef012345"), "abcdef");
    }
}
