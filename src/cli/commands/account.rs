//! Sign-in state on this device.

use tokio::runtime::Runtime;

use super::AppContext;
use crate::identity::{IdentitySource, LocalIdentity, LocalIdentityStore, Profile};
use crate::model::{UserId, UserRecord};
use crate::store::{BestEffort, RemoteStore};

/// Sign in by saving a local identity
pub(crate) fn cmd_login(
    rt: &Runtime,
    ctx: &AppContext,
    user_id: &str,
    name: Option<String>,
    email: Option<String>,
) -> anyhow::Result<()> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        anyhow::bail!("user id must not be empty");
    }

    let identity = LocalIdentity {
        user_id: UserId::new(user_id),
        profile: Profile {
            name,
            email,
            avatar_url: None,
        },
    };
    ctx.identity_store()?.save(&identity);

    let record = UserRecord {
        id: user_id.to_string(),
        email: identity.profile.email.clone(),
        name: identity.profile.name.clone(),
        avatar_url: None,
        last_song_id: None,
    };
    let outcome = BestEffort::log("upsert_user", rt.block_on(ctx.store.upsert_user(&record)));
    if !outcome.is_applied() {
        eprintln!("Warning: profile not saved remotely");
    }

    println!(
        "Signed in as {}",
        identity.profile.display_name(identity.user_id.as_str())
    );
    Ok(())
}

/// Sign out and forget the local identity
pub(crate) fn cmd_logout(rt: &Runtime, ctx: &AppContext) -> anyhow::Result<()> {
    rt.block_on(async {
        let resolver = ctx.resolver()?;
        let Some(identity) = resolver.resolve().await else {
            println!("Not signed in");
            return Ok(());
        };

        let result = resolver.sign_out().await;
        resolver.shutdown();
        if let Err(e) = result {
            eprintln!("Warning: session provider sign-out failed: {}", e);
        }
        println!(
            "Signed out {}",
            identity.profile.display_name(identity.user_id.as_str())
        );
        Ok(())
    })
}

/// Show the signed-in user
pub(crate) fn cmd_whoami(rt: &Runtime, ctx: &AppContext) -> anyhow::Result<()> {
    rt.block_on(async {
        let resolver = ctx.resolver()?;
        let identity = resolver.resolve().await;
        resolver.shutdown();

        match identity {
            Some(identity) => {
                let source = match identity.source {
                    IdentitySource::Session => "live session",
                    IdentitySource::Local => "this device",
                };
                println!(
                    "{} ({}), signed in on {}",
                    identity.profile.display_name(identity.user_id.as_str()),
                    identity.user_id,
                    source
                );
                if let Some(email) = &identity.profile.email {
                    println!("Email: {}", email);
                }
            }
            None => println!("Not signed in"),
        }
        Ok(())
    })
}
