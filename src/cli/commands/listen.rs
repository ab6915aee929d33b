//! Listening time tracking command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::runtime::Runtime;

use super::AppContext;
use crate::model::SongId;
use crate::tracker::{FlushOutcome, ListeningSessionTracker, SystemClock};

/// Track a song until Ctrl-C or for a fixed time, then record the minutes
pub(crate) fn cmd_listen(
    rt: &Runtime,
    ctx: &AppContext,
    song_id: SongId,
    seconds: Option<u64>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, user) = ctx.personalizer().await?;
        let song = personalizer
            .song(song_id)
            .with_context(|| format!("song {} is not in the catalog", song_id))?;

        let tracker =
            ListeningSessionTracker::new(ctx.store.clone(), Arc::new(SystemClock), user)
                .with_min_flush_minutes(ctx.config.ranking.min_flush_minutes);

        let report = tracker.start(song_id).await;
        if !report.last_played.is_applied() || !report.view_increment.is_applied() {
            eprintln!("Warning: play counters could not be updated");
        }

        match seconds {
            Some(secs) => {
                println!("▶ {} - {} ({}s)", song.artist, song.name, secs);
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            None => {
                println!("▶ {} - {} (Ctrl-C to stop)", song.artist, song.name);
                tokio::signal::ctrl_c().await?;
            }
        }

        match tracker.stop().await {
            Some(FlushOutcome::Recorded { minutes, .. }) => {
                println!("Recorded {:.2} minutes", minutes);
            }
            Some(FlushOutcome::TooShort { minutes, .. }) => {
                println!("Listened {:.2} minutes, too short to record", minutes);
            }
            Some(FlushOutcome::Failed { minutes, error, .. }) => {
                eprintln!("Failed to record {:.2} minutes: {}", minutes, error);
            }
            None => {}
        }
        Ok(())
    })
}
