//! tuneweaver - client-side data layer for a music streaming app.
//!
//! Fetches the catalog and a listener's likes, history and playlists from a
//! remote store, caches them, ranks personalized and trending songs, tracks
//! listening time and reconciles who the listener is.
//!
//! Leaf-first:
//! - [`identity`]: live session + local identity, merged into one effective identity
//! - [`catalog`]: lazily filled catalog and liked-set cache
//! - [`ranking`]: seed, history-batch and trending rankings
//! - [`personalize`]: loads, ranks and publishes the per-user views
//! - [`tracker`]: accumulates listening minutes into history
//!
//! The remote store is behind the [`store::RemoteStore`] trait; a SQLite
//! implementation backs the CLI.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod personalize;
pub mod ranking;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod tracker;
