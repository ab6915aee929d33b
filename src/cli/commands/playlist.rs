//! Playlist management commands.

use tokio::runtime::Runtime;

use super::{AppContext, PlaylistCommand, song_line};

/// Run one playlist subcommand
pub(crate) fn cmd_playlist(
    rt: &Runtime,
    ctx: &AppContext,
    action: &PlaylistCommand,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (personalizer, _) = ctx.personalizer().await?;

        match action {
            PlaylistCommand::List => {
                let playlists = personalizer.playlists();
                if playlists.is_empty() {
                    println!("No playlists. Create one with `tuneweaver playlist create <name>`.");
                }
                for playlist in playlists {
                    println!(
                        "{:>4}  {} ({} songs, cover {})",
                        playlist.id,
                        playlist.name,
                        playlist.song_count(),
                        playlist.cover
                    );
                    for song in &playlist.songs {
                        println!("    {}", song_line(song));
                    }
                }
            }
            PlaylistCommand::Create { name } => {
                let id = personalizer.create_playlist(name).await?;
                println!("Created playlist {} ({})", name.trim(), id);
            }
            PlaylistCommand::Rename { id, name } => {
                personalizer.rename_playlist(*id, name).await?;
                println!("Renamed playlist {} to {}", id, name.trim());
            }
            PlaylistCommand::Delete { id } => {
                personalizer.delete_playlist(*id).await?;
                println!("Deleted playlist {}", id);
            }
            PlaylistCommand::Add { id, song_id } => {
                personalizer.add_song_to_playlist(*id, *song_id).await?;
                println!("Added song {} to playlist {}", song_id, id);
            }
            PlaylistCommand::Remove { id, song_id } => {
                personalizer.remove_song_from_playlist(*id, *song_id).await?;
                println!("Removed song {} from playlist {}", song_id, id);
            }
        }
        Ok(())
    })
}
