//! Catalog import, browsing, recommendation and like commands.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use tokio::runtime::Runtime;

use super::{AppContext, print_songs};
use crate::model::{SongId, SongRecord};

/// Import catalog records from a JSON file
pub(crate) fn cmd_import(rt: &Runtime, ctx: &AppContext, path: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let songs: Vec<SongRecord> = serde_json::from_slice(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;

    let count = rt.block_on(ctx.store.import_songs(&songs))?;
    println!("Imported {} songs from {}", count, path.display());
    Ok(())
}

/// List the catalog
pub(crate) fn cmd_songs(
    rt: &Runtime,
    ctx: &AppContext,
    search: Option<&str>,
    liked: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;
        let songs = match (search, liked) {
            (Some(query), true) => personalizer
                .search(query)
                .into_iter()
                .filter(|s| s.liked)
                .collect(),
            (Some(query), false) => personalizer.search(query),
            (None, true) => personalizer.liked_songs(),
            (None, false) => personalizer.all_songs(),
        };
        print_songs("Songs", &songs);

        if let Some(song) = personalizer.last_played_song() {
            println!("Last played: {} - {}", song.artist, song.name);
        }
        Ok(())
    })
}

/// Most popular songs
pub(crate) fn cmd_trending(rt: &Runtime, ctx: &AppContext) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;
        print_songs("Trending", &personalizer.trending());
        Ok(())
    })
}

/// Recommendations from listening history
pub(crate) fn cmd_for_you(rt: &Runtime, ctx: &AppContext) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;
        let songs = personalizer.personalized_from_history();
        if songs.is_empty() {
            println!("No recommendations yet. Listen to a few songs with `tuneweaver listen`.");
            return Ok(());
        }
        print_songs("Picked for you", &songs);
        Ok(())
    })
}

/// Songs similar to one song
pub(crate) fn cmd_similar(
    rt: &Runtime,
    ctx: &AppContext,
    song_id: SongId,
    exclude: &[SongId],
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;
        let exclude: HashSet<SongId> = exclude.iter().copied().collect();
        let seed = personalizer
            .song(song_id)
            .with_context(|| format!("song {} is not in the catalog", song_id))?;

        let songs = personalizer.personalized_for_seed(&seed, &exclude).await?;
        print_songs(&format!("Like {} - {}", seed.artist, seed.name), &songs);
        Ok(())
    })
}

/// Like or unlike a song
pub(crate) fn cmd_like(rt: &Runtime, ctx: &AppContext, song_id: SongId) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;
        let outcome = personalizer.toggle_like(song_id).await?;
        let song = personalizer.song(song_id);
        let name = song.as_ref().map_or("song", |s| s.name.as_str());

        if outcome.liked {
            println!("♥ Liked {}", name);
        } else {
            println!("Removed {} from your likes", name);
        }
        if !outcome.like_count.is_applied() {
            eprintln!("Warning: the like counter could not be updated");
        }
        Ok(())
    })
}
