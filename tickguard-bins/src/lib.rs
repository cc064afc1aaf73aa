//! Shared setup for the tickguard binaries

pub mod common;
