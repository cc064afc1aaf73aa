//! Test doubles and builders shared by unit and integration tests
//!
//! - [`ScriptedFeed`]: programmable market data feed
//! - [`MemorySink`], [`RecordingTransport`], [`ScriptedConfigSource`]
//! - session time and settings builders, [`TestContext`]

pub mod doubles;
pub mod helpers;
pub mod scripted_feed;

pub use doubles::{MemorySink, RecordingTransport, ScriptedConfigSource};
pub use helpers::*;
pub use scripted_feed::{ScriptStep, ScriptedFeed};
