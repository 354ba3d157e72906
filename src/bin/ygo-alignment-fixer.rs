use anyhow::Context;
use clap::Parser;
use log::info;

use ygo_mod_tools::config::FixerArgs;
use ygo_mod_tools::patch::{self, PatchError};
use ygo_mod_tools::{dialog, logging};

fn main() -> anyhow::Result<()> {
    logging::init();

    let args = FixerArgs::parse();

    match patch::patch_file(&args.file) {
        Ok(sites) if sites.is_empty() => {
            info!("no aligned move pairs in {}", args.file.display());
        }
        Ok(sites) => {
            info!(
                "rewrote {} aligned move pair(s) in {}",
                sites.len(),
                args.file.display()
            );
        }
        Err(err @ PatchError::MissingFile(_)) => {
            dialog::show_error(&err.to_string());
            std::process::exit(err.exit_code());
        }
        Err(PatchError::Io(err)) => {
            return Err(err).with_context(|| format!("failed to patch {}", args.file.display()));
        }
    }

    Ok(())
}
