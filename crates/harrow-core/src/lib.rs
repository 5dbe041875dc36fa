#![forbid(unsafe_code)]

//! Core torrent domain types shared across the harrow workspace.

pub mod accountant;
pub mod status;
pub mod torrent;

pub use accountant::FreeSpaceAccountant;
pub use status::StatusMatcher;
pub use torrent::{RegistrationState, Torrent};
