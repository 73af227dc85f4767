use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Joins the parts of a continuity key.
pub const KEY_SEPARATOR: &str = ":::";

/// Grouping key used when a session has no application name at all.
pub const UNKNOWN_APP: &str = "Unknown App";

static BROWSER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)chrome|chromium|firefox|edge|brave|opera|safari")
        .expect("Browser pattern should be a valid regex")
});

/// Window title endings browsers append to the page title.
const BROWSER_TITLE_SUFFIXES: &[&str] = &[
    " - Google Chrome",
    " - Microsoft Edge",
    " - Mozilla Firefox",
    " - Brave",
    " - Opera",
    " - Chromium",
];

/// Maps a site to its canonical key whenever any of `needles` shows up in the hostname or
/// page title. Mirrors and short links collapse onto the same key this way.
#[derive(Debug)]
pub struct SiteRule {
    pub needles: &'static [&'static str],
    pub key: &'static str,
}

impl SiteRule {
    /// `haystack` must already be lowercase.
    pub fn matches(&self, haystack: &str) -> bool {
        self.needles.iter().any(|needle| haystack.contains(needle))
    }
}

/// Evaluated top to bottom, the first match wins.
pub static SITE_RULES: &[SiteRule] = &[
    SiteRule {
        needles: &["bilibili", "哔哩哔哩", "b23.tv"],
        key: "www.bilibili.com",
    },
    SiteRule {
        needles: &["youtube"],
        key: "www.youtube.com",
    },
    SiteRule {
        needles: &["github"],
        key: "github.com",
    },
    SiteRule {
        needles: &["zhihu", "知乎"],
        key: "www.zhihu.com",
    },
    SiteRule {
        needles: &["csdn"],
        key: "blog.csdn.net",
    },
    SiteRule {
        needles: &["stackoverflow"],
        key: "stackoverflow.com",
    },
    SiteRule {
        needles: &["chatgpt"],
        key: "chatgpt.com",
    },
];

pub fn is_browser(app_name: &str) -> bool {
    BROWSER_PATTERN.is_match(app_name)
}

/// Returns the url only when it parses, so garbage reported by a browser is treated as no
/// url at all.
pub fn valid_url(url: Option<&str>) -> Option<Url> {
    url.filter(|v| !v.is_empty())
        .and_then(|v| Url::parse(v).ok())
}

/// Fine-grained key deciding whether two consecutive samples belong to the same session.
pub fn continuity_key(app_name: &str, title: &str, url: Option<&str>) -> String {
    if is_browser(app_name) {
        if let Some(url) = url.filter(|v| valid_url(Some(*v)).is_some()) {
            return format!("{url}{KEY_SEPARATOR}{title}");
        }
    }
    format!("{app_name}{KEY_SEPARATOR}{title}")
}

/// Removes the browser name browsers put at the end of window titles.
pub fn strip_browser_suffix(title: &str) -> &str {
    BROWSER_TITLE_SUFFIXES
        .iter()
        .find_map(|suffix| title.strip_suffix(suffix))
        .unwrap_or(title)
}

/// Where a classification key came from. Only [KeyKind::Site] keys get their display title
/// inferred from page titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A hostname, either from the url or from [SITE_RULES].
    Site,
    /// A browser page without a usable url, grouped by its cleaned title.
    PageTitle,
    /// Any non-browser application, grouped by application name.
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: String,
    pub kind: KeyKind,
    /// Page title without the browser suffix, kept for display title inference. Only set for
    /// browsers.
    pub page_title: Option<String>,
}

/// Coarse key grouping sessions by site or application.
pub fn classify(app_name: &str, title: &str, url: Option<&str>) -> Classification {
    let application = if app_name.is_empty() {
        UNKNOWN_APP
    } else {
        app_name
    };

    if !is_browser(application) {
        return Classification {
            key: application.to_string(),
            kind: KeyKind::Application,
            page_title: None,
        };
    }

    let hostname = valid_url(url).and_then(|v| v.host_str().map(str::to_string));
    let clean_title = strip_browser_suffix(title).trim();

    let haystack = format!("{} {clean_title}", hostname.as_deref().unwrap_or_default())
        .to_lowercase();

    let (key, kind) = match SITE_RULES.iter().find(|rule| rule.matches(&haystack)) {
        Some(rule) => (rule.key.to_string(), KeyKind::Site),
        None => match hostname {
            Some(hostname) => (hostname, KeyKind::Site),
            None if !clean_title.is_empty() => (clean_title.to_string(), KeyKind::PageTitle),
            None => (application.to_string(), KeyKind::Application),
        },
    };

    Classification {
        key,
        kind,
        page_title: (!clean_title.is_empty()).then(|| clean_title.to_string()),
    }
}
