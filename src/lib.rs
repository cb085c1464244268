#![forbid(unsafe_code)]

//! Harvests video listings, descriptions and captions from YouTube playlists
//! and channels into CSV ledgers.

pub mod captions;
pub mod config;
pub mod harvest;
pub mod ledger;
pub mod logging;
pub mod prompt;
pub mod source;
pub mod subtitles;
pub mod validate;
