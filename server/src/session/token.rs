use uuid::Uuid;

/// Length of every token produced by [`UuidTokenGenerator`].
pub const TOKEN_LEN: usize = 32;

/// Source of unpredictable, fixed-length session tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUIDs rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_have_fixed_length() {
        let generator = UuidTokenGenerator;
        for _ in 0..16 {
            let token = generator.generate();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_tokens_differ() {
        let generator = UuidTokenGenerator;
        assert_ne!(generator.generate(), generator.generate());
    }
}
