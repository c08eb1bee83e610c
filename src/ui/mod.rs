//! Presentation helpers: embeds and player buttons.

pub mod buttons;
pub mod embeds;
