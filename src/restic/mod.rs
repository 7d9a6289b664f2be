use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use crate::config::{expand_home, Repository, Retention, Settings};

/// One restic invocation target: the binary plus the repository it acts on.
/// Destination and password travel as environment variables, everything else
/// as arguments; the subprocess inherits stdio so restic's own progress
/// output reaches the user.
pub struct Restic<'a> {
    bin: &'a str,
    repo: &'a Repository,
}

/// One entry of `restic snapshots --json`
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl Snapshot {
    /// The id restic prints in its own tables
    pub fn display_id(&self) -> &str {
        match &self.short_id {
            Some(short) => short,
            None => {
                let end = self.id.len().min(8);
                &self.id[..end]
            }
        }
    }
}

impl<'a> Restic<'a> {
    pub fn new(settings: &'a Settings, repo: &'a Repository) -> Self {
        Restic {
            bin: &settings.restic_bin,
            repo,
        }
    }

    /// `restic init` — create the repository at the destination
    pub fn init(&self) -> Result<()> {
        self.run(&["init".to_string()])
    }

    /// `restic backup <paths> --exclude <pattern>...`
    pub fn backup(&self) -> Result<()> {
        self.run(&backup_args(self.repo))
    }

    /// `restic forget --keep-* --prune` from the retention record
    pub fn forget(&self, retention: &Retention) -> Result<()> {
        self.run(&forget_args(retention))
    }

    /// `restic restore <snapshot> --target <dir> [--include <file>...]`
    pub fn restore(&self, snapshot: &str, target: &Path, files: &[String]) -> Result<()> {
        self.run(&restore_args(snapshot, target, files))
    }

    /// `restic snapshots --json`, captured and deserialized
    pub fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let output = Command::new(self.bin)
            .args(["snapshots", "--json"])
            .env("RESTIC_REPOSITORY", &self.repo.destination)
            .env("RESTIC_PASSWORD", &self.repo.password)
            .output()
            .with_context(|| format!("running {} snapshots", self.bin))?;

        if !output.status.success() {
            anyhow::bail!(
                "restic snapshots failed for '{}': {}",
                self.repo.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let snapshots: Vec<Snapshot> = serde_json::from_slice(&output.stdout)
            .context("parsing restic snapshots output")?;
        Ok(snapshots)
    }

    /// Spawn restic with inherited stdio and forward its exit status
    fn run(&self, args: &[String]) -> Result<()> {
        let op = args.first().map(String::as_str).unwrap_or("");
        tracing::debug!(repo = %self.repo.name, "{} {}", self.bin, args.join(" "));

        let status = Command::new(self.bin)
            .args(args)
            .env("RESTIC_REPOSITORY", &self.repo.destination)
            .env("RESTIC_PASSWORD", &self.repo.password)
            .status()
            .with_context(|| format!("running {} {}", self.bin, op))?;

        if !status.success() {
            anyhow::bail!("restic {} failed for '{}' ({})", op, self.repo.name, status);
        }
        Ok(())
    }
}

/// `restic self-update`, used by the `update` subcommand. Needs no repository.
pub fn self_update(settings: &Settings) -> Result<()> {
    let status = Command::new(&settings.restic_bin)
        .arg("self-update")
        .status()
        .with_context(|| {
            format!(
                "running {} self-update — is restic installed?",
                settings.restic_bin
            )
        })?;
    if !status.success() {
        anyhow::bail!("restic self-update failed ({})", status);
    }
    Ok(())
}

/// `restic version`, captured for reporting
pub fn version(settings: &Settings) -> Result<String> {
    let output = Command::new(&settings.restic_bin)
        .arg("version")
        .output()
        .with_context(|| format!("running {} version", settings.restic_bin))?;
    if !output.status.success() {
        anyhow::bail!("restic version failed ({})", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn backup_args(repo: &Repository) -> Vec<String> {
    let mut args = vec!["backup".to_string()];
    for path in &repo.paths {
        args.push(expand_home(path));
    }
    for pattern in &repo.exclude {
        args.push("--exclude".to_string());
        args.push(pattern.clone());
    }
    args
}

fn forget_args(retention: &Retention) -> Vec<String> {
    let mut args = vec!["forget".to_string()];
    let buckets = [
        ("--keep-last", retention.last),
        ("--keep-daily", retention.daily),
        ("--keep-weekly", retention.weekly),
        ("--keep-monthly", retention.monthly),
    ];
    for (flag, count) in buckets {
        if let Some(count) = count {
            args.push(flag.to_string());
            args.push(count.to_string());
        }
    }
    args.push("--prune".to_string());
    args
}

fn restore_args(snapshot: &str, target: &Path, files: &[String]) -> Vec<String> {
    let mut args = vec![
        "restore".to_string(),
        snapshot.to_string(),
        "--target".to_string(),
        target.display().to_string(),
    ];
    for file in files {
        args.push("--include".to_string());
        args.push(file.clone());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn repo() -> Repository {
        Repository {
            name: "home".to_string(),
            destination: "sftp:backup@host:repo".to_string(),
            password: "secret".to_string(),
            paths: vec!["/etc".to_string(), "~/documents".to_string()],
            exclude: vec!["*.tmp".to_string(), "node_modules".to_string()],
            retention: None,
            pre_backup: None,
            post_backup: None,
        }
    }

    #[test]
    fn backup_args_expand_home_and_pass_excludes() {
        let args = backup_args(&repo());
        let home = dirs::home_dir().unwrap().join("documents");

        assert_eq!(args[0], "backup");
        assert_eq!(args[1], "/etc");
        assert_eq!(args[2], home.to_string_lossy());
        assert_eq!(
            &args[3..],
            &["--exclude", "*.tmp", "--exclude", "node_modules"]
        );
    }

    #[test]
    fn forget_args_only_carry_present_buckets() {
        let retention = Retention {
            last: Some(5),
            daily: None,
            weekly: Some(4),
            monthly: None,
        };
        assert_eq!(
            forget_args(&retention),
            &["forget", "--keep-last", "5", "--keep-weekly", "4", "--prune"]
        );
    }

    #[test]
    fn restore_args_with_includes() {
        let args = restore_args(
            "a1b2c3d4",
            &PathBuf::from("/tmp/out"),
            &["/etc/fstab".to_string()],
        );
        assert_eq!(
            args,
            &["restore", "a1b2c3d4", "--target", "/tmp/out", "--include", "/etc/fstab"]
        );
    }

    #[test]
    fn restore_args_without_includes() {
        let args = restore_args("latest", &PathBuf::from("/"), &[]);
        assert_eq!(args, &["restore", "latest", "--target", "/"]);
    }

    #[test]
    fn snapshot_json_parses_restic_output() {
        // Trimmed `restic snapshots --json` output; tags may be null
        let json = r#"[
            {
                "time": "2024-03-01T02:00:01.123456789Z",
                "tree": "deadbeef",
                "paths": ["/etc", "/home/user/documents"],
                "hostname": "apollo",
                "username": "user",
                "tags": null,
                "id": "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90",
                "short_id": "a1b2c3d4"
            }
        ]"#;

        let snapshots: Vec<Snapshot> = serde_json::from_str(json).unwrap();
        assert_eq!(snapshots.len(), 1);
        let snap = &snapshots[0];
        assert_eq!(snap.display_id(), "a1b2c3d4");
        assert_eq!(snap.hostname, "apollo");
        assert_eq!(snap.paths.len(), 2);
        assert!(snap.tags.is_none());
        assert_eq!(snap.time.format("%Y-%m-%d").to_string(), "2024-03-01");
    }

    #[test]
    fn display_id_falls_back_to_id_prefix() {
        let snap = Snapshot {
            id: "a1b2c3d4e5f60718".to_string(),
            short_id: None,
            time: Utc::now(),
            hostname: String::new(),
            paths: vec![],
            tags: None,
        };
        assert_eq!(snap.display_id(), "a1b2c3d4");
    }
}
