//! Configuration
//!
//! - `types`: the watchlist entries (`SymbolConfig`) and session tunables
//!   (`SessionSettings`)
//! - `source`: hot reload of the watchlist
//! - `constants`: defaults and venue hours

pub mod constants;
pub mod source;
pub mod types;

pub use source::{ConfigSource, FileConfigSource};
pub use types::{
    load_symbols, parse_symbols, ConfigError, LogPaths, SessionSettings, SymbolConfig,
};
