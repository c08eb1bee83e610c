//! # Audio Module
//!
//! Per-guild playback scheduling for the jukebox bot.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild sessions
//! - One [`session::GuildSession`] per guild, created on first use
//! - Queue, status and voice handle behind a per-session lock
//!
//! ### [`player`] - Scheduler
//! - Enqueue, skip, stop, leave, join, pause and resume
//! - A driver task per session consumes completion signals in order, so a
//!   guild never has two tracks audible at once
//!
//! ### [`reaper`] - Idle reaper
//! - Periodically disconnects sessions whose channel has no human listeners
//!
//! ### [`voice`] / [`songbird_voice`] - Voice transport
//! - Trait seam between the scheduler and songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jukebox::audio::{player::{PlaybackPolicy, Scheduler}, voice::VoiceTransport};
//! use jukebox::sources::Resolver;
//! use serenity::all::{ChannelId, GuildId, UserId};
//! use std::sync::Arc;
//!
//! # async fn example(resolver: Arc<dyn Resolver>, transport: Arc<dyn VoiceTransport>) -> anyhow::Result<()> {
//! let scheduler = Scheduler::new(resolver, transport, PlaybackPolicy::default());
//! let guild_id = GuildId::new(123456789);
//!
//! let queued = scheduler
//!     .play(guild_id, Some(ChannelId::new(42)), "lofi hip hop", UserId::new(7))
//!     .await?;
//! println!("En cola en la posición {}", queued.position);
//!
//! scheduler.skip(guild_id).await?;
//! scheduler.leave(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod player;
pub mod queue;
pub mod reaper;
pub mod session;
pub mod songbird_voice;
pub mod voice;
