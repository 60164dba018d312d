//! User-agent parsing.
//!
//! `UserAgentParser` is the seam for a full UA database; the bundled
//! `RegexUserAgentParser` recognizes the browsers, operating systems and
//! handsets that make up nearly all form traffic. Anything it cannot place
//! comes back as `None` and is defaulted to "Unknown" by the caller.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::storage::models::{defaults, VersionInfo};

use super::EnrichmentError;

/// Family plus dotted version components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentPart {
    pub family: Option<String>,
    pub major: Option<String>,
    pub minor: Option<String>,
    pub patch: Option<String>,
}

impl AgentPart {
    fn named(family: &str) -> Self {
        Self {
            family: Some(family.to_string()),
            ..Self::default()
        }
    }

    fn from_captures(family: &str, caps: &Captures<'_>) -> Self {
        let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        Self {
            family: Some(family.to_string()),
            major: part(1),
            minor: part(2),
            patch: part(3),
        }
    }

    /// Dotted version of whatever components are present.
    pub fn version(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.major.as_deref(),
            self.minor.as_deref(),
            self.patch.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }

    pub fn to_info(&self) -> VersionInfo {
        let unknown = || defaults::UNKNOWN.to_string();
        VersionInfo {
            family: self.family.clone().unwrap_or_else(unknown),
            version: self.version().unwrap_or_else(unknown),
            major: self.major.clone().unwrap_or_else(unknown),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub family: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub browser: AgentPart,
    pub os: AgentPart,
    pub device: DeviceIdentity,
}

pub trait UserAgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> Result<ParsedUserAgent, EnrichmentError>;
}

const VERSION: &str = r"(\d+)(?:\.(\d+))?(?:\.(\d+))?";

lazy_static! {
    /// Browser rules, most specific first: Edge/Opera/Samsung embed Chrome
    /// tokens, and Chrome embeds Safari.
    static ref BROWSER_RULES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(&format!(r"Edg(?:e|A|iOS)?/{}", VERSION)).unwrap(), "Edge"),
        (Regex::new(&format!(r"OPR/{}", VERSION)).unwrap(), "Opera"),
        (Regex::new(&format!(r"SamsungBrowser/{}", VERSION)).unwrap(), "Samsung Internet"),
        (Regex::new(&format!(r"CriOS/{}", VERSION)).unwrap(), "Chrome Mobile iOS"),
        (Regex::new(&format!(r"FxiOS/{}", VERSION)).unwrap(), "Firefox iOS"),
        (Regex::new(&format!(r"Chrome/{}.*Mobile", VERSION)).unwrap(), "Chrome Mobile"),
        (Regex::new(&format!(r"Chrome/{}", VERSION)).unwrap(), "Chrome"),
        (Regex::new(&format!(r"Firefox/{}", VERSION)).unwrap(), "Firefox"),
        (Regex::new(&format!(r"Version/{}.*Mobile.*Safari/", VERSION)).unwrap(), "Mobile Safari"),
        (Regex::new(&format!(r"Version/{}.*Safari/", VERSION)).unwrap(), "Safari"),
        (Regex::new(r"MSIE (\d+)\.(\d+)").unwrap(), "IE"),
        (Regex::new(r"Trident/.*rv:(\d+)\.(\d+)").unwrap(), "IE"),
    ];

    static ref OS_RULES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?:iPhone|CPU) OS (\d+)_(\d+)(?:_(\d+))?").unwrap(), "iOS"),
        (Regex::new(r"Android (\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap(), "Android"),
        (Regex::new(r"Windows NT (\d+)\.(\d+)").unwrap(), "Windows"),
        (Regex::new(r"Mac OS X (\d+)[_.](\d+)(?:[_.](\d+))?").unwrap(), "Mac OS X"),
        (Regex::new(r"CrOS \S+ (\d+)\.(\d+)(?:\.(\d+))?").unwrap(), "Chrome OS"),
    ];

    static ref LINUX_PATTERN: Regex = Regex::new(r"Linux|X11").unwrap();

    static ref SAMSUNG_MODEL: Regex = Regex::new(r"; (SM-[A-Z0-9]+)").unwrap();
    static ref PIXEL_MODEL: Regex = Regex::new(r"; (Pixel[^;)]*?)(?: Build|;|\))").unwrap();
    static ref ANDROID_MODEL: Regex = Regex::new(r"Android [\d.]+; ([^;)]+?)(?: Build|;|\))").unwrap();
}

/// Regex-table parser, no external database.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexUserAgentParser;

impl RegexUserAgentParser {
    pub fn new() -> Self {
        Self
    }

    fn first_match(rules: &[(Regex, &'static str)], ua: &str) -> Option<AgentPart> {
        rules
            .iter()
            .find_map(|(re, family)| re.captures(ua).map(|c| AgentPart::from_captures(family, &c)))
    }

    fn device(ua: &str) -> DeviceIdentity {
        let apple = |model: &str| DeviceIdentity {
            family: Some(model.to_string()),
            brand: Some("Apple".to_string()),
            model: Some(model.to_string()),
        };

        if ua.contains("iPad") {
            return apple("iPad");
        }
        if ua.contains("iPhone") {
            return apple("iPhone");
        }
        if ua.contains("iPod") {
            return apple("iPod");
        }
        if let Some(model) = SAMSUNG_MODEL.captures(ua).and_then(|c| c.get(1)) {
            return DeviceIdentity {
                family: Some(format!("Samsung {}", model.as_str())),
                brand: Some("Samsung".to_string()),
                model: Some(model.as_str().to_string()),
            };
        }
        if let Some(model) = PIXEL_MODEL.captures(ua).and_then(|c| c.get(1)) {
            let model = model.as_str().trim();
            return DeviceIdentity {
                family: Some(model.to_string()),
                brand: Some("Google".to_string()),
                model: Some(model.to_string()),
            };
        }
        if let Some(model) = ANDROID_MODEL.captures(ua).and_then(|c| c.get(1)) {
            let model = model.as_str().trim();
            if !model.is_empty() && model != "K" && model != "wv" {
                return DeviceIdentity {
                    family: Some(model.to_string()),
                    brand: None,
                    model: Some(model.to_string()),
                };
            }
        }
        DeviceIdentity::default()
    }
}

impl UserAgentParser for RegexUserAgentParser {
    fn parse(&self, user_agent: &str) -> Result<ParsedUserAgent, EnrichmentError> {
        let browser = Self::first_match(&BROWSER_RULES, user_agent).unwrap_or_default();
        let os = Self::first_match(&OS_RULES, user_agent).unwrap_or_else(|| {
            if LINUX_PATTERN.is_match(user_agent) {
                AgentPart::named("Linux")
            } else {
                AgentPart::default()
            }
        });

        Ok(ParsedUserAgent {
            browser,
            os,
            device: Self::device(user_agent),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const EDGE_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAMSUNG_ANDROID: &str = "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 \
        (KHTML, like Gecko) SamsungBrowser/23.0 Chrome/115.0.0.0 Mobile Safari/537.36";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    fn parse(ua: &str) -> ParsedUserAgent {
        RegexUserAgentParser::new().parse(ua).unwrap()
    }

    #[test]
    fn test_chrome_on_windows() {
        let parsed = parse(CHROME_WIN);
        assert_eq!(parsed.browser.to_info().family, "Chrome");
        assert_eq!(parsed.browser.to_info().version, "120.0.6099");
        assert_eq!(parsed.browser.to_info().major, "120");
        assert_eq!(parsed.os.to_info().family, "Windows");
        assert_eq!(parsed.os.to_info().version, "10.0");
        assert_eq!(parsed.device, DeviceIdentity::default());
    }

    #[test]
    fn test_safari_on_iphone() {
        let parsed = parse(SAFARI_IPHONE);
        assert_eq!(parsed.browser.family.as_deref(), Some("Mobile Safari"));
        assert_eq!(parsed.os.to_info().version, "17.1.2");
        assert_eq!(parsed.device.brand.as_deref(), Some("Apple"));
        assert_eq!(parsed.device.model.as_deref(), Some("iPhone"));
    }

    #[test]
    fn test_edge_wins_over_chrome() {
        let parsed = parse(EDGE_MAC);
        assert_eq!(parsed.browser.family.as_deref(), Some("Edge"));
        assert_eq!(parsed.os.family.as_deref(), Some("Mac OS X"));
        assert_eq!(parsed.os.to_info().version, "10.15.7");
    }

    #[test]
    fn test_samsung_device() {
        let parsed = parse(SAMSUNG_ANDROID);
        assert_eq!(parsed.browser.family.as_deref(), Some("Samsung Internet"));
        assert_eq!(parsed.os.to_info().major, "13");
        assert_eq!(parsed.device.brand.as_deref(), Some("Samsung"));
        assert_eq!(parsed.device.model.as_deref(), Some("SM-S918B"));
    }

    #[test]
    fn test_firefox_on_linux() {
        let parsed = parse(FIREFOX_LINUX);
        assert_eq!(parsed.browser.to_info().version, "121.0");
        assert_eq!(parsed.os.to_info().family, "Linux");
        assert_eq!(parsed.os.to_info().version, "Unknown");
    }

    #[test]
    fn test_empty_agent_is_all_unknown() {
        let parsed = parse("");
        assert_eq!(parsed.browser.to_info(), VersionInfo::default());
        assert_eq!(parsed.os.to_info(), VersionInfo::default());
        assert_eq!(parsed.device, DeviceIdentity::default());
    }
}
