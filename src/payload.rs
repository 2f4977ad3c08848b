//! # Payload Codec
//!
//! Generates and checks the fixed-pattern buffers used to pad every test
//! message to the configured size. Byte `i` of an `n`-byte buffer is always
//! `i % 10`; peers built by other toolchains rely on this exact pattern, so it
//! must stay bit-compatible.

use crate::error::PayloadError;
use tracing::error;

/// Build an `n`-byte validation buffer.
pub fn generate(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 10) as u8).collect()
}

/// Check a received buffer against the expected size and pattern.
///
/// Reports the length mismatch first; otherwise the first index whose byte
/// does not follow the pattern.
pub fn verify(buffer: &[u8], expected_size: usize) -> Result<(), PayloadError> {
    if buffer.len() != expected_size {
        return Err(PayloadError::LengthMismatch {
            expected: expected_size,
            actual: buffer.len(),
        });
    }

    match buffer
        .iter()
        .enumerate()
        .find(|(i, &b)| b != (i % 10) as u8)
    {
        Some((index, &actual)) => Err(PayloadError::ByteMismatch {
            index,
            expected: (index % 10) as u8,
            actual,
        }),
        None => Ok(()),
    }
}

/// Verify a buffer and log any corruption at error level.
///
/// Returns `true` when the buffer is intact. Never fails; corruption does not
/// change accounting or control flow.
pub fn validate(buffer: &[u8], expected_size: usize, origin: &str) -> bool {
    match verify(buffer, expected_size) {
        Ok(()) => true,
        Err(e) => {
            error!("Data integrity error in message from {}: {}", origin, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_follows_pattern() {
        assert!(generate(0).is_empty());
        assert_eq!(generate(12), vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1]);
    }

    #[test]
    fn test_generated_buffers_verify() {
        for size in [0, 1, 9, 10, 11, 100, 4096] {
            assert_eq!(verify(&generate(size), size), Ok(()));
        }
    }

    #[test]
    fn test_wrong_length_is_reported() {
        let buffer = generate(64);
        assert_eq!(
            verify(&buffer, 100),
            Err(PayloadError::LengthMismatch {
                expected: 100,
                actual: 64
            })
        );
    }

    #[test]
    fn test_single_flipped_byte_reports_its_index() {
        for index in [0, 5, 57, 99] {
            let mut buffer = generate(100);
            buffer[index] ^= 0xFF;
            assert_eq!(
                verify(&buffer, 100),
                Err(PayloadError::ByteMismatch {
                    index,
                    expected: (index % 10) as u8,
                    actual: ((index % 10) as u8) ^ 0xFF,
                })
            );
        }
    }

    #[test]
    fn test_validate_does_not_panic_on_corruption() {
        assert!(validate(&generate(10), 10, "alpha"));
        assert!(!validate(&[1, 2, 3], 10, "alpha"));
    }
}
