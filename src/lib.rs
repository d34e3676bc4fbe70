//! Keeps a small always-on-top window in sync with the Music app.
//!
//! The [`Synchronizer`] owns the published [`PlaybackState`], the decoded
//! artwork and the playlist view. It talks to the player through an
//! [`Automation`] backend on a worker thread and reacts to change
//! notifications, command confirmations and a handful of delayed follow-ups.

pub mod artwork;
pub mod automation;
pub mod config;
pub mod error;
pub mod estimator;
pub mod intent;
pub mod logging;
pub mod model;
pub mod notifications;
pub mod reply;
pub mod retry;
pub mod script;
pub mod synchronizer;
pub mod worker;

pub use automation::{Automation, OsaScript};
pub use error::{Error, Result};
pub use model::{PlaybackState, PlaylistEntry, PlaylistSnapshot, RepeatMode, TrackIdentity};
pub use script::{PlayerCommand, ScriptBuilder};
pub use synchronizer::{SyncSettings, Synchronizer};
