use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{Config, Repository, Settings};
use crate::restic::Restic;

/// Hooks given on the command line, overriding the record's own for one run
#[derive(Debug, Default)]
pub struct HookOverrides {
    pub pre: Option<PathBuf>,
    pub post: Option<PathBuf>,
}

/// Outcome of an aggregate run over one or more repositories
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    fn ok(&mut self, name: &str) {
        self.succeeded.push(name.to_string());
    }

    fn fail(&mut self, name: &str) {
        self.failed.push(name.to_string());
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Telegram message body, parse_mode=HTML
    pub fn telegram_text(&self, verb: &str) -> String {
        let when = Utc::now().format("%Y-%m-%d %H:%M UTC");
        if self.failed.is_empty() {
            format!(
                "✅ <b>resticron</b> — {} of {} repositories succeeded ({})",
                verb,
                self.succeeded.len(),
                when
            )
        } else {
            format!(
                "❌ <b>resticron</b> — {} failed for {} of {} repositories: <code>{}</code> ({})",
                verb,
                self.failed.len(),
                self.total(),
                self.failed.join(", "),
                when
            )
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "✓ {} succeeded", self.succeeded.len())?;
        if !self.failed.is_empty() {
            write!(f, ", ❌ {} failed: {}", self.failed.len(), self.failed.join(", "))?;
        }
        Ok(())
    }
}

/// Back up the named repository, or every configured one in document order.
/// Repositories run sequentially, one subprocess at a time; a failure is
/// counted and the loop moves on — prior successes are not rolled back.
pub async fn run(cfg: &Config, name: Option<&str>, overrides: &HookOverrides) -> Result<()> {
    let repos = cfg.select(name)?;
    let mut summary = RunSummary::default();

    for repo in repos {
        println!("▶ Backing up '{}' → {}", repo.name, repo.destination);
        match backup_one(&cfg.settings, repo, overrides) {
            Ok(()) => {
                println!("  ✓ '{}' done", repo.name);
                summary.ok(&repo.name);
            }
            Err(e) => {
                tracing::error!("backup of '{}' failed: {:#}", repo.name, e);
                summary.fail(&repo.name);
            }
        }
    }

    println!("{}", summary);
    notify(cfg, &summary, "backup").await;

    if !summary.failed.is_empty() {
        anyhow::bail!("{} of {} backups failed", summary.failed.len(), summary.total());
    }
    Ok(())
}

/// One repository: pre-backup hook, restic backup, retention, post-backup hook
fn backup_one(settings: &Settings, repo: &Repository, overrides: &HookOverrides) -> Result<()> {
    let restic = Restic::new(settings, repo);

    // Pre-hook failure aborts before any snapshot is taken
    if let Some(hook) = overrides.pre.as_ref().or(repo.pre_backup.as_ref()) {
        run_hook(hook, &repo.name, "pre-backup")?;
    }

    restic.backup()?;

    if let Some(retention) = &repo.retention {
        if !retention.is_empty() {
            restic.forget(retention)?;
        }
    }

    // The snapshot exists by now; a failing post-hook still fails the run
    if let Some(hook) = overrides.post.as_ref().or(repo.post_backup.as_ref()) {
        run_hook(hook, &repo.name, "post-backup")?;
    }

    Ok(())
}

/// Hooks receive the repository name as their sole argument
fn run_hook(hook: &Path, repo_name: &str, stage: &str) -> Result<()> {
    tracing::info!("running {} hook {} for '{}'", stage, hook.display(), repo_name);
    let status = Command::new(hook)
        .arg(repo_name)
        .status()
        .with_context(|| format!("running {} hook {}", stage, hook.display()))?;
    if !status.success() {
        anyhow::bail!(
            "{} hook {} failed for '{}' ({})",
            stage,
            hook.display(),
            repo_name,
            status
        );
    }
    Ok(())
}

/// Initialize the named restic repository, or all of them
pub fn init(cfg: &Config, name: Option<&str>) -> Result<()> {
    let repos = cfg.select(name)?;
    let mut summary = RunSummary::default();

    for repo in repos {
        println!("▶ Initializing '{}' at {}", repo.name, repo.destination);
        match Restic::new(&cfg.settings, repo).init() {
            Ok(()) => summary.ok(&repo.name),
            Err(e) => {
                tracing::error!("init of '{}' failed: {:#}", repo.name, e);
                summary.fail(&repo.name);
            }
        }
    }

    println!("{}", summary);
    if !summary.failed.is_empty() {
        anyhow::bail!("{} of {} inits failed", summary.failed.len(), summary.total());
    }
    Ok(())
}

/// Print the snapshot table for one repository, or for all of them
pub fn list(cfg: &Config, name: Option<&str>, verbose: bool) -> Result<()> {
    let repos = cfg.select(name)?;
    let mut summary = RunSummary::default();

    for repo in repos {
        println!("{} ({})", repo.name, repo.destination);
        match Restic::new(&cfg.settings, repo).snapshots() {
            Ok(snapshots) if snapshots.is_empty() => {
                println!("  no snapshots");
                summary.ok(&repo.name);
            }
            Ok(snapshots) => {
                for snap in &snapshots {
                    println!(
                        "  {}  {}",
                        snap.display_id(),
                        snap.time.format("%Y-%m-%d %H:%M:%S")
                    );
                    if verbose {
                        println!("      host: {}", snap.hostname);
                        if let Some(tags) = snap.tags.as_ref().filter(|t| !t.is_empty()) {
                            println!("      tags: {}", tags.join(", "));
                        }
                        for path in &snap.paths {
                            println!("      {}", path);
                        }
                    }
                }
                println!("  {} snapshots", snapshots.len());
                summary.ok(&repo.name);
            }
            Err(e) => {
                tracing::error!("listing '{}' failed: {:#}", repo.name, e);
                summary.fail(&repo.name);
            }
        }
    }

    if summary.total() > 1 {
        println!("{}", summary);
    }
    if !summary.failed.is_empty() {
        anyhow::bail!(
            "{} of {} repositories could not be listed",
            summary.failed.len(),
            summary.total()
        );
    }
    Ok(())
}

/// Best effort: delivery problems are logged, never fatal to the run
async fn notify(cfg: &Config, summary: &RunSummary, verb: &str) {
    if let Some(tg) = &cfg.settings.telegram {
        if let Err(e) = crate::telegram::send(tg, &summary.telegram_text(verb)).await {
            tracing::warn!("telegram notification failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_and_formats() {
        let mut summary = RunSummary::default();
        summary.ok("home");
        summary.ok("work");
        summary.fail("offsite");

        assert_eq!(summary.total(), 3);
        let text = summary.to_string();
        assert!(text.contains("2 succeeded"));
        assert!(text.contains("1 failed: offsite"));
    }

    #[test]
    fn telegram_text_reports_failures_in_html() {
        let mut summary = RunSummary::default();
        summary.ok("home");
        summary.fail("offsite");

        let text = summary.telegram_text("backup");
        assert!(text.starts_with("❌"));
        assert!(text.contains("<code>offsite</code>"));

        let mut all_ok = RunSummary::default();
        all_ok.ok("home");
        let text = all_ok.telegram_text("backup");
        assert!(text.starts_with("✅"));
        assert!(text.contains("1 repositories"));
    }

    #[test]
    fn hooks_get_the_repo_name_and_exit_status_is_checked() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("invoked");

        let hook = dir.path().join("hook.sh");
        let mut f = std::fs::File::create(&hook).unwrap();
        writeln!(f, "#!/bin/sh\necho \"$1\" > {}", marker.display()).unwrap();
        drop(f);
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        run_hook(&hook, "home", "pre-backup").unwrap();
        let recorded = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(recorded.trim(), "home");

        let failing = dir.path().join("fail.sh");
        std::fs::write(&failing, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&failing, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = run_hook(&failing, "home", "post-backup").unwrap_err();
        assert!(err.to_string().contains("post-backup"));
    }
}
