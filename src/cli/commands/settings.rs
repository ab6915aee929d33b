//! Config file management.

use std::path::Path;

use anyhow::Context as _;

use super::ConfigCommand;
use crate::config::{self, Config};

/// Write a default config file, or print the one in effect
pub(crate) fn cmd_config(path: Option<&Path>, action: &ConfigCommand) -> anyhow::Result<()> {
    match action {
        ConfigCommand::Init { force } => {
            let target = match path {
                Some(p) => p.to_path_buf(),
                None => config::config_path().context("no config directory on this system")?,
            };
            if target.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    target.display()
                );
            }

            let defaults = Config::default();
            match path {
                Some(p) => config::save_to(&defaults, p)?,
                None => config::save(&defaults)?,
            }
            println!("Wrote default config to {}", target.display());
        }
        ConfigCommand::Show => {
            let config = match path {
                Some(p) => config::load_from(p),
                None => config::load(),
            };
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
