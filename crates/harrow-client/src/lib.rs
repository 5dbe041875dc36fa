#![forbid(unsafe_code)]

//! Torrent client adapters.
//!
//! The engine only ever talks to [`ClientAdapter`] (and [`TagAdapter`]
//! for tag-capable clients); the concrete qBittorrent and Deluge
//! implementations live behind it.

mod adapter;
mod deluge;
mod domain;
mod error;
mod qbittorrent;

pub use adapter::{ClientAdapter, TagAdapter};
pub use deluge::{Deluge, DelugeSettings};
pub use domain::{is_pseudo_tracker, registrable_domain, tracker_host};
pub use error::{ClientError, ClientResult};
pub use qbittorrent::{Qbittorrent, QbittorrentSettings};
