//! # Audio Module
//!
//! Per-guild playback state and the coordinator that drives it.
//!
//! ## Architecture
//!
//! ### [`store`] - Guild State Store
//! - One [`queue::GuildQueue`] per guild behind its own async lock
//! - `mutate` is the only read-modify-write path
//!
//! ### [`coordinator`] - Playback Coordinator
//! - Implements every user command as a single mutation
//! - Re-entered by track-end signals tagged with the connection session
//!
//! ### [`player`] / [`voice`] - Audio Output
//! - `PlayerHandle` abstracts the voice connection
//! - `voice` implements it on top of Songbird
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let coordinator = PlaybackCoordinator::new(store, resolver, connector, 1000);
//! coordinator.initialize(guild_id);
//!
//! coordinator.join(guild_id, Some(channel_id)).await?;
//! coordinator.enqueue(guild_id, "never gonna give you up", QueuePosition::End).await?;
//! coordinator.play_next(guild_id).await?;
//! ```

pub mod coordinator;
pub mod player;
pub mod queue;
pub mod store;
pub mod track;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
