use std::collections::{BTreeSet, HashMap};

use chrono::Duration;

use crate::daemon::storage::entities::VisitEntity;

use super::{
    keys::{classify, KeyKind},
    titles::display_title,
};

/// How many rows statistics keep. Merging the tail into an "Others" bucket is left to
/// whoever displays them.
pub const DEFAULT_TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStat {
    pub title: String,
    pub key: String,
    pub duration: Duration,
}

#[derive(Debug)]
struct KeyUsage {
    kind: KeyKind,
    duration: Duration,
    page_titles: BTreeSet<String>,
}

/// Groups visits by classification key, sums their durations and labels every group.
/// The result is sorted by duration, longest first, and holds at most `limit` rows.
pub fn aggregate(visits: impl IntoIterator<Item = VisitEntity>, limit: usize) -> Vec<UsageStat> {
    let mut map = HashMap::<String, KeyUsage>::new();

    for visit in visits {
        let url = (!visit.url.is_empty()).then_some(&*visit.url);
        let classification = classify(&visit.app_name, &visit.title, url);
        let usage = map
            .entry(classification.key)
            .or_insert_with(|| KeyUsage {
                kind: classification.kind,
                duration: Duration::zero(),
                page_titles: BTreeSet::new(),
            });
        usage.duration += visit.duration;
        if let Some(title) = classification.page_title {
            usage.page_titles.insert(title);
        }
    }

    let mut stats = map
        .into_iter()
        .map(|(key, usage)| UsageStat {
            title: display_title(&key, usage.kind, usage.page_titles.iter().map(String::as_str)),
            key,
            duration: usage.duration,
        })
        .collect::<Vec<_>>();

    stats.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.key.cmp(&b.key)));
    stats.truncate(limit);
    stats
}

/// Tracked time of all visits, including the ones that fall outside the top rows.
pub fn total_duration<'a>(visits: impl IntoIterator<Item = &'a VisitEntity>) -> Duration {
    visits
        .into_iter()
        .fold(Duration::zero(), |sum, v| sum + v.duration)
}
