use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Get the current unix timestamp in milliseconds
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NameError {
    #[error("name string must not be empty")]
    Empty,
    #[error("name string {0} cannot contain '+', '/' or '#' characters")]
    InvalidCharacter(String),
}

/// Validate a group id, node id or host id against the Sparkplug topic rules
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().any(|c| matches!(c, '+' | '/' | '#')) {
        return Err(NameError::InvalidCharacter(name.to_string()));
    }
    Ok(())
}

/// Next value of a wrapping Sparkplug counter (seq or bdSeq)
pub fn next_seq(seq: u64) -> u64 {
    (seq + 1) % crate::constants::SEQ_MODULO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valiate_name_valid_strings() {
        assert!(validate_name("hello").is_ok());
        assert!(validate_name("BME280").is_ok());
        assert!(validate_name("hello_world").is_ok());
    }

    #[test]
    fn test_validate_name_invalid_strings() {
        assert_eq!(validate_name(""), Err(NameError::Empty));
        assert!(validate_name("hello+world").is_err());
        assert!(validate_name("hello/world").is_err());
        assert!(validate_name("hello#world").is_err());
        assert!(validate_name("hello+/#world").is_err());
    }

    #[test]
    fn seq_wraps() {
        assert_eq!(next_seq(0), 1);
        assert_eq!(next_seq(254), 255);
        assert_eq!(next_seq(255), 0);
    }
}
