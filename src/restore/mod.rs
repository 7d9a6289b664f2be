use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::restic::Restic;

/// Restore a snapshot. Default target is a fresh directory next to the
/// caller; `-g` restores over the original locations; `-p` picks the target
/// directory; `-f` limits restoration to the given files.
pub fn restore(
    cfg: &Config,
    name: &str,
    snapshot: &str,
    files: &[String],
    in_place: bool,
    path: Option<PathBuf>,
) -> Result<()> {
    let repo = cfg
        .repository(name)
        .ok_or_else(|| anyhow::anyhow!("no repository named '{}'", name))?;

    let target = resolve_target(name, snapshot, in_place, path)?;

    println!(
        "▶ Restoring snapshot {} of '{}' to {}",
        snapshot,
        name,
        target.display()
    );
    Restic::new(&cfg.settings, repo).restore(snapshot, &target, files)?;
    println!("✓ Restored to {}", target.display());
    Ok(())
}

/// `-g` means in place: target `/`, snapshot paths land on their original
/// absolute locations. Otherwise an explicit `-p` directory, or a fresh
/// `restore-<repo>-<snapshot>` directory in the working directory.
fn resolve_target(
    name: &str,
    snapshot: &str,
    in_place: bool,
    path: Option<PathBuf>,
) -> Result<PathBuf> {
    match (in_place, path) {
        (true, Some(_)) => anyhow::bail!("-g restores in place; it cannot be combined with -p"),
        (true, None) => Ok(PathBuf::from("/")),
        (false, Some(path)) => Ok(path),
        (false, None) => Ok(PathBuf::from(format!("restore-{}-{}", name, snapshot))),
    }
}
