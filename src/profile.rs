//! Per-browser profiles
//!
//! Every browser renders the same logical page with different quirks: how far
//! a swipe actually scrolls, whether the accessibility tree exposes web
//! content at all, and which one-time dialogs block the first launch. All of
//! that is static data, looked up once per session and injected into the
//! components that need it.

use serde::{Deserialize, Serialize};

/// Direction to continue searching after the initial calculated scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDirection {
    /// Browser tends to undershoot: keep scrolling down
    Down,
    /// Browser tends to overshoot: back up while searching
    Up,
}

/// Static configuration for one browser identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserProfile {
    /// Identity key ("chrome", "samsung", ...)
    pub name: String,
    /// Android package launched for URL intents
    pub package: String,
    /// Multiplier correcting swipe distance to real scroll distance
    pub scroll_factor: f64,
    /// Where to keep looking once the initial scroll lands nearby
    pub search_direction: SearchDirection,
    /// Ordered button texts dismissed on first launch
    pub first_run_labels: Vec<String>,
    /// True when the tree does not expose web content; forces template and
    /// coordinate based interaction, and disables the persisted element cache
    pub coordinate_only: bool,
}

impl BrowserProfile {
    /// Built-in profile for a known browser, `None` for unknown identities
    pub fn builtin(name: &str) -> Option<BrowserProfile> {
        let profile = match name {
            "chrome" => BrowserProfile {
                name: "chrome".into(),
                package: "com.android.chrome".into(),
                scroll_factor: 1.1,
                search_direction: SearchDirection::Down,
                first_run_labels: labels(&[
                    "동의 및 계속",
                    "Accept & continue",
                    "동의",
                    "계속",
                    "아니요",
                    "No thanks",
                    "건너뛰기",
                    "Skip",
                    "사용 안함",
                    "No, thanks",
                ]),
                coordinate_only: false,
            },
            "samsung" => BrowserProfile {
                name: "samsung".into(),
                package: "com.sec.android.app.sbrowser".into(),
                scroll_factor: 0.9,
                search_direction: SearchDirection::Up,
                first_run_labels: labels(&[
                    "계속", "동의", "시작", "Start", "확인", "OK", "건너뛰기", "Skip",
                ]),
                coordinate_only: true,
            },
            "edge" => BrowserProfile {
                name: "edge".into(),
                package: "com.microsoft.emmx".into(),
                scroll_factor: 1.1,
                search_direction: SearchDirection::Down,
                first_run_labels: labels(&[
                    "수락", "Accept", "시작", "Start", "건너뛰기", "Skip", "아니요", "No thanks",
                ]),
                coordinate_only: true,
            },
            "opera" => BrowserProfile {
                name: "opera".into(),
                package: "com.opera.browser".into(),
                scroll_factor: 1.1,
                search_direction: SearchDirection::Down,
                first_run_labels: labels(&["동의", "Accept", "시작", "Start", "건너뛰기", "Skip"]),
                coordinate_only: true,
            },
            "firefox" => BrowserProfile {
                name: "firefox".into(),
                package: "org.mozilla.firefox".into(),
                scroll_factor: 1.0,
                search_direction: SearchDirection::Down,
                first_run_labels: labels(&[
                    "시작하기",
                    "Get started",
                    "건너뛰기",
                    "Skip",
                    "나중에",
                    "Later",
                ]),
                coordinate_only: true,
            },
            _ => return None,
        };
        Some(profile)
    }

    /// Built-in profile, defaulting to chrome for unknown names
    pub fn builtin_or_chrome(name: &str) -> BrowserProfile {
        Self::builtin(name).unwrap_or_else(|| {
            Self::builtin("chrome").expect("chrome profile is always defined")
        })
    }

    /// Whether the external scroll-hint service applies (Chromium family only)
    pub fn accepts_scroll_hints(&self) -> bool {
        matches!(self.name.as_str(), "chrome" | "edge" | "opera" | "samsung")
    }
}

fn labels(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_exist() {
        for name in ["chrome", "samsung", "firefox", "opera", "edge"] {
            let p = BrowserProfile::builtin(name).unwrap();
            assert_eq!(p.name, name);
            assert!(!p.first_run_labels.is_empty());
        }
        assert!(BrowserProfile::builtin("netscape").is_none());
    }

    #[test]
    fn test_samsung_is_coordinate_only_and_overshoots() {
        let p = BrowserProfile::builtin("samsung").unwrap();
        assert!(p.coordinate_only);
        assert_eq!(p.search_direction, SearchDirection::Up);
        assert!(p.scroll_factor < 1.0);
    }

    #[test]
    fn test_chrome_uses_tree_and_undershoots() {
        let p = BrowserProfile::builtin("chrome").unwrap();
        assert!(!p.coordinate_only);
        assert_eq!(p.search_direction, SearchDirection::Down);
        assert!(p.scroll_factor > 1.0);
    }

    #[test]
    fn test_unknown_falls_back_to_chrome() {
        let p = BrowserProfile::builtin_or_chrome("netscape");
        assert_eq!(p.name, "chrome");
    }
}
