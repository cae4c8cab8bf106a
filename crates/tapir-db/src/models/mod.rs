//! Legacy table models.

pub mod admin_audit;
pub mod email_change_token;
pub mod nickname;
pub mod session;
pub mod user;

pub use admin_audit::{NewAdminAudit, TapirAdminAudit};
pub use email_change_token::{TapirEmailChangeToken, TokenUsage};
pub use nickname::TapirNickname;
pub use session::TapirSession;
pub use user::{TapirUser, TapirUserFlag};

/// Clip a string to at most `max` bytes on a char boundary.
///
/// Legacy varchar columns silently reject (strict mode) or truncate
/// over-long values, so writers clip before binding.
#[must_use]
pub fn clip(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_short_value_unchanged() {
        assert_eq!(clip("10.0.0.1", 16), "10.0.0.1");
    }

    #[test]
    fn test_clip_long_ipv6() {
        let ip = "2001:0db8:85a3:0000:0000:8a2e:0370:7334";
        assert_eq!(clip(ip, 16), "2001:0db8:85a3:0");
    }

    #[test]
    fn test_clip_respects_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(clip("aé", 2), "a");
    }
}
