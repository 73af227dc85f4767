//! Everything that turns signals and window samples into sessions: the polling loop
//! ([collector::ActivityTracker]), the idle decision, the [arbiter::SessionArbiter] state
//! machine and the inbound browser feed.

pub mod arbiter;
pub mod collector;
pub mod feed;
pub mod idle;
