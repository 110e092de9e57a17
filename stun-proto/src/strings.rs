use crate::error::{StunError, StunErrorType};
use precis_core::profile::PrecisFastInvocation;
use precis_profiles::OpaqueString;
use std::borrow::Cow;

pub fn opaque_string_prepare(s: &str) -> Result<Cow<'_, str>, precis_core::Error> {
    OpaqueString::prepare(s)
}

pub fn opaque_string_enforce(s: &str) -> Result<Cow<'_, str>, precis_core::Error> {
    OpaqueString::enforce(s)
}

/// Fails with `ValueTooLong` if `value` exceeds `max_bytes` bytes or
/// `max_chars` characters.
pub fn check_text_limits(
    value: &str,
    max_bytes: usize,
    max_chars: Option<usize>,
) -> Result<(), StunError> {
    if value.len() > max_bytes {
        return Err(StunError::new(
            StunErrorType::ValueTooLong,
            format!("Value length {} > max. {} bytes", value.len(), max_bytes),
        ));
    }
    if let Some(max_chars) = max_chars {
        let chars = value.chars().count();
        if chars > max_chars {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!("Value length {} > max. {} characters", chars, max_chars),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_string() {
        assert_eq!(
            opaque_string_enforce("foo\u{1680}bar").expect("Can not enforce"),
            "foo bar"
        );
        assert!(opaque_string_prepare("example.org").is_ok());
    }

    #[test]
    fn text_limits() {
        assert!(check_text_limits("abc", 3, None).is_ok());
        assert_eq!(
            check_text_limits("abcd", 3, None).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );
        // Three bytes, one character
        assert!(check_text_limits("\u{30DE}", 3, Some(1)).is_ok());
        assert_eq!(
            check_text_limits("\u{30DE}\u{30C8}", 10, Some(1)).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );
    }
}
