//! Turns raw window samples and stored sessions into keys and labels.
//!
//! Two granularities exist:
//!  - the continuity key ([keys::continuity_key]) separates individual pages and documents and
//!    decides where one session ends and the next begins;
//!  - the classification key ([keys::classify]) groups by site or application and is only used
//!    when aggregating history into [aggregate::UsageStat]s.
//!
//! Both are derived from the same `(application, title, url)` triple so the tracker and the
//! statistics agree on what a browser is and what a URL looks like.

pub mod aggregate;
pub mod keys;
pub mod titles;
