//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `catalog`: import, browsing, recommendations and likes
//! - `playlist`: playlist management
//! - `account`: signing in and out on this device
//! - `listen`: listening time tracking
//! - `settings`: the config file

mod account;
mod catalog;
mod listen;
mod playlist;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::identity::{FileIdentityStore, IdentityResolver, OfflineSessionProvider};
use crate::model::{PlaylistId, Song, SongId, UserId};
use crate::personalize::Personalizer;
use crate::store::sqlite::db_url;
use crate::store::SqliteStore;

use account::{cmd_login, cmd_logout, cmd_whoami};
use catalog::{cmd_for_you, cmd_import, cmd_like, cmd_similar, cmd_songs, cmd_trending};
use listen::cmd_listen;
use playlist::cmd_playlist;
use settings::cmd_config;

/// tuneweaver CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (overrides the config file)
    #[arg(long, global = true, env = "TUNEWEAVER_DB")]
    pub db: Option<PathBuf>,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Import catalog records from a JSON file
    Import {
        /// JSON array of song records
        path: PathBuf,
    },
    /// List the catalog, most viewed first
    Songs {
        /// Only songs whose name or artist contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Only liked songs
        #[arg(long)]
        liked: bool,
    },
    /// Most popular songs
    Trending,
    /// Recommendations from your listening history
    ForYou,
    /// Songs similar to a song
    Similar {
        song_id: SongId,
        /// Song ids to leave out (comma separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<SongId>,
    },
    /// Like a song, or unlike it if already liked
    Like { song_id: SongId },
    /// Track listening time for a song
    Listen {
        song_id: SongId,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        action: PlaylistCommand,
    },
    /// Sign in on this device
    Login {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out on this device
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the settings in effect
    Show,
}

/// Playlist subcommands
#[derive(Subcommand)]
pub enum PlaylistCommand {
    /// List your playlists
    List,
    /// Create an empty playlist
    Create { name: String },
    /// Rename a playlist
    Rename { id: PlaylistId, name: String },
    /// Delete a playlist
    Delete { id: PlaylistId },
    /// Add a song to a playlist
    Add { id: PlaylistId, song_id: SongId },
    /// Remove a song from a playlist
    Remove { id: PlaylistId, song_id: SongId },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    // Config commands work without a database
    if let Commands::Config { action } = &cli.command {
        return cmd_config(cli.config.as_deref(), action);
    }

    let rt = Runtime::new()?;
    let ctx = rt.block_on(AppContext::open(cli))?;

    match &cli.command {
        Commands::Import { path } => cmd_import(&rt, &ctx, path),
        Commands::Songs { search, liked } => cmd_songs(&rt, &ctx, search.as_deref(), *liked),
        Commands::Trending => cmd_trending(&rt, &ctx),
        Commands::ForYou => cmd_for_you(&rt, &ctx),
        Commands::Similar { song_id, exclude } => cmd_similar(&rt, &ctx, *song_id, exclude),
        Commands::Like { song_id } => cmd_like(&rt, &ctx, *song_id),
        Commands::Listen { song_id, seconds } => cmd_listen(&rt, &ctx, *song_id, *seconds),
        Commands::Playlist { action } => cmd_playlist(&rt, &ctx, action),
        Commands::Login {
            user_id,
            name,
            email,
        } => cmd_login(&rt, &ctx, user_id, name.clone(), email.clone()),
        Commands::Logout => cmd_logout(&rt, &ctx),
        Commands::Whoami => cmd_whoami(&rt, &ctx),
        Commands::Config { action } => cmd_config(cli.config.as_deref(), action),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Config and store shared by every command.
pub(crate) struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
}

impl AppContext {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => config::load_from(path),
            None => config::load(),
        };

        let db_path = cli.db.clone().or_else(|| config.library.database_path());
        if let Some(dir) = db_path.as_deref().and_then(|p| p.parent()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }
        let url = db_url(db_path.as_deref());
        let store = SqliteStore::open(&url)
            .await
            .with_context(|| format!("opening {}", url))?;

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn identity_store(&self) -> anyhow::Result<FileIdentityStore> {
        let path = self
            .config
            .identity
            .identity_path()
            .context("no data directory for the local identity")?;
        Ok(FileIdentityStore::new(path))
    }

    /// Start an identity resolver over this device's identity file.
    pub fn resolver(&self) -> anyhow::Result<IdentityResolver> {
        Ok(IdentityResolver::start(
            Arc::new(OfflineSessionProvider::new()),
            Arc::new(self.identity_store()?),
            Some(self.store.clone()),
            self.config.identity.session_timeout(),
        ))
    }

    /// Resolve the signed-in user and load their views.
    pub async fn personalizer(&self) -> anyhow::Result<(Personalizer, UserId)> {
        let resolver = self.resolver()?;
        let identity = resolver.resolve().await;
        resolver.shutdown();

        let identity =
            identity.context("not signed in; run `tuneweaver login <user-id>` first")?;
        let personalizer = Personalizer::from_config(self.store.clone(), &self.config);
        personalizer.bind_identity(Some(&identity));
        personalizer
            .refresh_all(&identity.user_id)
            .await
            .context("loading your library")?;
        Ok((personalizer, identity.user_id))
    }
}

/// Print a numbered song table.
pub(crate) fn print_songs(title: &str, songs: &[Song]) {
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    if songs.is_empty() {
        println!("(nothing here yet)");
        return;
    }
    for song in songs {
        println!("{}", song_line(song));
    }
    println!();
}

pub(crate) fn song_line(song: &Song) -> String {
    format!(
        "{:>6}  {} - {} [{}] {} views, {} likes{}",
        song.id,
        song.artist,
        song.name,
        song.language,
        song.views,
        song.likes,
        if song.liked { "  ♥" } else { "" }
    )
}
