use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

use crate::config::Config;
use crate::restic;

const INSTALL_DIR: &str = "/usr/local/bin";

/// Put the binary on PATH and seed a config skeleton on first install
pub fn install(cfg: &Config) -> Result<()> {
    let exe = std::env::current_exe().context("resolving the running binary")?;
    let target = Path::new(INSTALL_DIR).join("resticron");

    if exe == target {
        println!("✓ Already installed at {}", target.display());
    } else {
        install_binary(&exe, &target)?;
        println!("✓ Installed {}", target.display());
    }

    let config_path = Config::active_path();
    if !config_path.exists() {
        cfg.store()?;
        println!("✓ Config skeleton written to {}", config_path.display());
    }

    println!();
    println!("Next steps:");
    println!("  Add repositories:   resticron config");
    println!("  Initialize them:    resticron init");
    println!("  Schedule backups:   resticron crontab");
    Ok(())
}

fn install_binary(exe: &Path, target: &Path) -> Result<()> {
    match std::fs::copy(exe, target) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            // Not writable for this user, go through sudo
            let status = Command::new("sudo")
                .args(["install", "-m", "755"])
                .arg(exe)
                .arg(target)
                .status()
                .context("running sudo install")?;
            if !status.success() {
                anyhow::bail!("could not install to {} ({})", target.display(), status);
            }
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("copying binary to {}", target.display())),
    }
}

/// Update the external restic binary and report its version
pub fn update(cfg: &Config) -> Result<()> {
    println!("▶ Updating restic...");
    restic::self_update(&cfg.settings)?;
    let version = restic::version(&cfg.settings)?;
    println!("✓ {}", version);
    Ok(())
}
