//! Random identifier tokens for entities minted by this process.

use rand::RngCore;

/// Length of generated id tokens.
const ID_LEN: usize = 15;

/// Generates a random 15-character hex token.
///
/// Collisions are improbable enough that ids double as primary keys.
pub fn generate() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut token = hex::encode(bytes);
    token.truncate(ID_LEN);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_hex_of_fixed_length() {
        let id = generate();
        assert_eq!(id.len(), 15);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_are_unique_in_practice() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate()));
        }
    }
}
