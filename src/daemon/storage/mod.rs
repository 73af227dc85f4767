//!  Storage is organized through [session_storage::SessionStorageImpl].
//!  The basic idea is:
//!   - There is a directory with all the sessions.
//!   - Sessions are stored in day files, one per UTC day of the session start.
//!   - Each session is one JSON line. The line of the session being tracked is rewritten in
//!     place as the session grows.

pub mod entities;
pub mod query;
pub mod session_storage;

#[cfg(test)]
pub mod memory;
