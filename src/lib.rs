//! Jukebox: per-guild Discord music scheduler.
//!
//! The [`audio`] module holds the playback core (sessions, scheduler, idle
//! reaper); [`sources`] resolves requests through yt-dlp and Spotify;
//! [`bot`] and [`ui`] are the Discord command surface.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
