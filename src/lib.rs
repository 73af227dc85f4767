//! Tracks which application or web page has the user's attention and turns it into
//! statistics.
//!
//! The daemon ([daemon]) polls the focused window and presence signals once per tick and
//! records continuous blocks of attention as sessions. The cli ([cli]) reads those sessions
//! back and groups them by site or application ([classification]).

pub mod classification;
pub mod cli;
pub mod daemon;
pub mod utils;
pub mod window_api;
