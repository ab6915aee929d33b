//! Command-line interface for tuneweaver.
//!
//! Browse the catalog, get recommendations, manage likes and playlists and
//! record listening time against a local SQLite store.

mod commands;

pub use commands::{Cli, Commands, ConfigCommand, PlaylistCommand, run_command};
