//! Device type classification.
//!
//! Substring matching over the raw user-agent. Mobile keywords are checked
//! before tablet keywords, so a string carrying both is mobile.

use lazy_static::lazy_static;
use regex::Regex;

use crate::storage::models::DeviceType;

lazy_static! {
    static ref MOBILE_PATTERN: Regex = Regex::new(
        r"(?i)mobile|android|iphone|ipod|blackberry|opera mini|iemobile"
    ).unwrap();

    static ref TABLET_PATTERN: Regex = Regex::new(r"(?i)tablet|ipad").unwrap();
}

pub fn classify_device(user_agent: &str) -> DeviceType {
    if MOBILE_PATTERN.is_match(user_agent) {
        DeviceType::Mobile
    } else if TABLET_PATTERN.is_match(user_agent) {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_common_agents() {
        assert_eq!(
            classify_device("Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X)"),
            DeviceType::Mobile
        );
        assert_eq!(
            classify_device("Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X)"),
            DeviceType::Tablet
        );
        assert_eq!(
            classify_device("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0"),
            DeviceType::Desktop
        );
        assert_eq!(classify_device(""), DeviceType::Desktop);
    }

    #[test]
    fn test_mobile_checked_before_tablet() {
        assert_eq!(
            classify_device("Mozilla/5.0 (iPad; CPU OS 16_6) Mobile/15E148"),
            DeviceType::Mobile
        );
        // Android tablets advertise "Android" and are classified mobile.
        assert_eq!(
            classify_device("Mozilla/5.0 (Linux; Android 13; SM-X710) Tablet"),
            DeviceType::Mobile
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_device("OPERA MINI/8.0"), DeviceType::Mobile);
        assert_eq!(classify_device("some TABLET agent"), DeviceType::Tablet);
    }

    proptest! {
        #[test]
        fn prop_mobile_keyword_wins(prefix in "[a-z ]{0,10}", suffix in "[a-z ]{0,10}") {
            let ua = format!("{}ipad{}mobile{}", prefix, suffix, prefix);
            prop_assert_eq!(classify_device(&ua), DeviceType::Mobile);
        }
    }
}
