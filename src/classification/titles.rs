use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

use super::keys::KeyKind;

/// Labels for keys that should never be guessed.
pub static FIXED_TITLES: &[(&str, &str)] = &[
    ("www.bilibili.com", "哔哩哔哩 (Bilibili)"),
    ("www.youtube.com", "YouTube"),
    ("github.com", "GitHub"),
    ("www.zhihu.com", "知乎 (Zhihu)"),
    ("blog.csdn.net", "CSDN"),
    ("stackoverflow.com", "Stack Overflow"),
    ("chatgpt.com", "ChatGPT"),
    ("localhost", "Dwell Dashboard"),
];

/// Separators sites use between the page name and the site name: hyphen, pipe, en and em
/// dash, middle dot, bullet and double colon.
static TITLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(?:[-|\x{2013}\x{2014}\x{00B7}\x{2022}]|::)\s+")
        .expect("Title separator should be a valid regex")
});

pub fn fixed_title(key: &str) -> Option<&'static str> {
    FIXED_TITLES
        .iter()
        .find(|(fixed_key, _)| *fixed_key == key)
        .map(|(_, title)| *title)
}

/// Resolves the label shown for a classification key. `page_titles` are the cleaned titles
/// observed for the key.
pub fn display_title<'a>(
    key: &str,
    kind: KeyKind,
    page_titles: impl IntoIterator<Item = &'a str>,
) -> String {
    if let Some(title) = fixed_title(key) {
        return title.to_string();
    }
    // Only site keys look like a domain, whether they came from a hostname or a site rule.
    match kind {
        KeyKind::Site => infer_site_title(key, page_titles),
        KeyKind::PageTitle | KeyKind::Application => key.to_string(),
    }
}

/// Guesses a site's name from its page titles. A segment that keeps reappearing at the end
/// (or the start) of titles is most likely the site name, e.g. `GitHub` in
/// `Pull Requests - GitHub`.
pub fn infer_site_title<'a>(domain: &str, page_titles: impl IntoIterator<Item = &'a str>) -> String {
    let titles = page_titles
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>();

    if titles.is_empty() {
        return domain_label(domain);
    }

    let mut suffixes = BTreeMap::<&str, usize>::new();
    let mut prefixes = BTreeMap::<&str, usize>::new();
    for title in &titles {
        let mut segments = TITLE_SEPARATOR
            .split(title)
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let Some(first) = segments.next() else {
            continue;
        };
        let last = segments.last().unwrap_or(first);
        *prefixes.entry(first).or_default() += 1;
        *suffixes.entry(last).or_default() += 1;
    }

    let suffix = recurring_candidate(&suffixes, titles.len());
    let prefix = recurring_candidate(&prefixes, titles.len());

    let chosen = match (suffix, prefix) {
        (Some((suffix, suffix_count)), Some((prefix, prefix_count))) => {
            if suffix_count >= prefix_count {
                Some(suffix)
            } else {
                Some(prefix)
            }
        }
        (Some((suffix, _)), None) => Some(suffix),
        (None, Some((prefix, _))) => Some(prefix),
        (None, None) => None,
    };

    chosen
        .or_else(|| titles.iter().copied().min_by_key(|v| (v.chars().count(), *v)))
        .map(str::to_string)
        .unwrap_or_else(|| domain_label(domain))
}

/// A candidate recurs when it shows up in at least two titles or in at least 30% of them.
fn recurs(count: usize, total: usize) -> bool {
    count >= 2 || count * 10 >= total * 3
}

/// Most frequent recurring candidate. Ties go to the shorter one, then alphabetical order.
fn recurring_candidate<'a>(
    counts: &BTreeMap<&'a str, usize>,
    total: usize,
) -> Option<(&'a str, usize)> {
    counts
        .iter()
        .filter(|(_, count)| recurs(**count, total))
        .min_by(|a, b| {
            b.1.cmp(a.1)
                .then_with(|| a.0.chars().count().cmp(&b.0.chars().count()))
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(candidate, count)| (*candidate, *count))
}

/// `www.example.com` becomes `Example.com`.
fn domain_label(domain: &str) -> String {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    let mut chars = domain.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::classification::keys::KeyKind;

    use super::{display_title, infer_site_title};

    #[test]
    fn fixed_titles_take_priority() {
        assert_eq!(
            display_title("www.bilibili.com", KeyKind::Site, ["Some Video"]),
            "哔哩哔哩 (Bilibili)"
        );
        assert_eq!(display_title("github.com", KeyKind::Site, ["Other"]), "GitHub");
    }

    #[test]
    fn infers_recurring_suffix() {
        let titles = ["Issue #1 · repo - GitHub", "Pull Requests - GitHub", "GitHub"];
        assert_eq!(infer_site_title("git.example.com", titles), "GitHub");
    }

    #[test]
    fn infers_recurring_prefix() {
        let titles = [
            "Rust Forum | Async traits",
            "Rust Forum | Lifetimes",
            "Rust Forum | Pinning",
            "Rust Forum | Macros",
        ];
        assert_eq!(infer_site_title("users.rust-lang.org", titles), "Rust Forum");
    }

    #[test]
    fn suffix_wins_ties() {
        let titles = ["Docs :: Intro - Handbook", "Docs :: Setup - Handbook"];
        assert_eq!(infer_site_title("handbook.example.com", titles), "Handbook");
    }

    #[test]
    fn falls_back_to_shortest_title() {
        let titles = [
            "First article about something",
            "Second piece",
            "Third longer article title",
            "Yet another long title here",
        ];
        assert_eq!(infer_site_title("news.example.com", titles), "Second piece");
    }

    #[test]
    fn falls_back_to_capitalized_domain() {
        assert_eq!(infer_site_title("www.example.com", std::iter::empty()), "Example.com");
        assert_eq!(infer_site_title("docs.rs", ["   "]), "Docs.rs");
    }

    #[test]
    fn non_site_keys_are_their_own_title() {
        assert_eq!(display_title("Code.exe", KeyKind::Application, std::iter::empty()), "Code.exe");
        assert_eq!(
            display_title("Some Page", KeyKind::PageTitle, ["Some Page"]),
            "Some Page"
        );
    }
}
