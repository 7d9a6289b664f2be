use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The whole persisted document: global settings plus the repository table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub settings: Settings,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Name or path of the restic executable
    #[serde(default = "default_restic_bin")]
    pub restic_bin: String,
    /// Where the crontab entry redirects stdout/stderr
    pub log_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: i64,
}

/// One named backup destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    /// Backend URI understood by restic, e.g. `sftp:user@host:path`
    pub destination: String,
    pub password: String,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_backup: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_backup: Option<PathBuf>,
}

/// Snapshot counts to keep per time bucket, forwarded to `restic forget`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u32>,
}

fn default_restic_bin() -> String {
    "restic".to_string()
}

impl Retention {
    pub fn is_empty(&self) -> bool {
        self.last.is_none() && self.daily.is_none() && self.weekly.is_none() && self.monthly.is_none()
    }
}

impl Config {
    /// Standard config file locations (checked in order)
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("resticron.json"),
            PathBuf::from("/etc/resticron/resticron.json"),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.insert(1, home.join(".config/resticron/resticron.json"));
        }
        paths
    }

    /// The file `store` writes to: the first existing location, or the
    /// per-user default when none exists yet.
    pub fn active_path() -> PathBuf {
        Self::config_paths()
            .into_iter()
            .find(|p| p.exists())
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_default()
                    .join(".config/resticron/resticron.json")
            })
    }

    /// Load config from first available location
    pub fn load() -> Result<Self> {
        for path in Self::config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        // No file yet: start from defaults, `config` or `install` will create one
        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        Ok(config)
    }

    /// Full-document rewrite. Last writer wins, there is no locking.
    pub fn store(&self) -> Result<()> {
        self.store_to(&Self::active_path())
    }

    pub fn store_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    /// Look up a repository by name (linear scan, `name` is the unique key)
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// The repositories an aggregate command operates on: the named one, or
    /// all of them in document order.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&Repository>> {
        match name {
            Some(name) => {
                let repo = self.repository(name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "no repository named '{}' — run `resticron config` to add one",
                        name
                    )
                })?;
                Ok(vec![repo])
            }
            None => {
                if self.repositories.is_empty() {
                    anyhow::bail!("no repositories configured — run `resticron config` to add one");
                }
                Ok(self.repositories.iter().collect())
            }
        }
    }

    /// Pretty-print the document with passwords and the bot token masked
    pub fn show(&self) -> Result<String> {
        let mut masked = self.clone();
        for repo in &mut masked.repositories {
            repo.password = "********".to_string();
        }
        if let Some(tg) = &mut masked.settings.telegram {
            tg.token = "********".to_string();
        }
        Ok(serde_json::to_string_pretty(&masked)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: Settings {
                restic_bin: default_restic_bin(),
                log_file: PathBuf::from("/var/log/resticron.log"),
                telegram: None,
            },
            repositories: vec![],
        }
    }
}

/// Expand a leading `~` against the home directory. Paths are stored the way
/// the user typed them and expanded when handed to restic.
pub fn expand_home(path: &str) -> String {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Interactive configuration editor
pub async fn menu() -> Result<()> {
    let mut cfg = Config::load()?;

    println!("resticron configuration ({})", Config::active_path().display());
    loop {
        println!();
        println!("  {} repositories configured", cfg.repositories.len());
        println!("  1) List repositories");
        println!("  2) Add repository");
        println!("  3) Edit repository");
        println!("  4) Delete repository");
        println!("  5) Telegram notifications");
        println!("  6) Log file");
        println!("  q) Save and quit");
        println!();

        match prompt("Choice: ", "q")?.as_str() {
            "1" => list_repositories(&cfg),
            "2" => add_repository(&mut cfg)?,
            "3" => edit_repository(&mut cfg)?,
            "4" => delete_repository(&mut cfg)?,
            "5" => telegram_settings(&mut cfg).await?,
            "6" => {
                let current = cfg.settings.log_file.display().to_string();
                let input = prompt(&format!("Log file [{}]: ", current), &current)?;
                cfg.settings.log_file = PathBuf::from(input);
            }
            "q" | "Q" => break,
            other => println!("  Unknown choice: {}", other),
        }
    }

    cfg.store()?;
    println!("✓ Config written to {}", Config::active_path().display());
    Ok(())
}

fn list_repositories(cfg: &Config) {
    if cfg.repositories.is_empty() {
        println!("  No repositories configured.");
        return;
    }
    for repo in &cfg.repositories {
        println!("  {} → {}", repo.name, repo.destination);
        for path in &repo.paths {
            println!("      {}", path);
        }
    }
}

fn add_repository(cfg: &mut Config) -> Result<()> {
    let name = loop {
        let input = prompt("Name: ", "")?;
        if input.is_empty() {
            continue;
        }
        if cfg.repository(&input).is_some() {
            println!("  ❌ A repository named '{}' already exists", input);
            continue;
        }
        break input;
    };

    let repo = prompt_repository_fields(Repository {
        name,
        destination: String::new(),
        password: String::new(),
        paths: vec![],
        exclude: vec![],
        retention: None,
        pre_backup: None,
        post_backup: None,
    })?;

    println!("  ✓ Added '{}'", repo.name);
    cfg.repositories.push(repo);
    Ok(())
}

fn edit_repository(cfg: &mut Config) -> Result<()> {
    let name = prompt("Repository to edit: ", "")?;
    let Some(idx) = cfg.repositories.iter().position(|r| r.name == name) else {
        println!("  ❌ No repository named '{}'", name);
        return Ok(());
    };

    let updated = prompt_repository_fields(cfg.repositories[idx].clone())?;
    cfg.repositories[idx] = updated;
    println!("  ✓ Updated '{}'", name);
    Ok(())
}

fn delete_repository(cfg: &mut Config) -> Result<()> {
    let name = prompt("Repository to delete: ", "")?;
    let Some(idx) = cfg.repositories.iter().position(|r| r.name == name) else {
        println!("  ❌ No repository named '{}'", name);
        return Ok(());
    };

    let question = format!(
        "Delete '{}'? Snapshots at the destination are kept. [n]: ",
        name
    );
    if prompt_yn(&question, false)? {
        cfg.repositories.remove(idx);
        println!("  ✓ Deleted '{}'", name);
    }
    Ok(())
}

/// Prompt for every repository field, offering current values as defaults
fn prompt_repository_fields(mut repo: Repository) -> Result<Repository> {
    repo.destination = prompt_with_default("Destination (restic URI)", &repo.destination)?;
    repo.password = prompt_with_default("Password", &repo.password)?;

    let paths = prompt_with_default("Paths to back up (comma-separated)", &repo.paths.join(","))?;
    repo.paths = split_list(&paths);
    let exclude =
        prompt_with_default("Exclude patterns (comma-separated)", &repo.exclude.join(","))?;
    repo.exclude = split_list(&exclude);

    let retention_default = repo.retention.is_some();
    let retention_q = format!(
        "Set a retention policy? [{}]: ",
        if retention_default { "y" } else { "n" }
    );
    if prompt_yn(&retention_q, retention_default)? {
        let current = repo.retention.clone().unwrap_or_default();
        let retention = Retention {
            last: prompt_count("Keep last", current.last)?,
            daily: prompt_count("Keep daily", current.daily)?,
            weekly: prompt_count("Keep weekly", current.weekly)?,
            monthly: prompt_count("Keep monthly", current.monthly)?,
        };
        repo.retention = if retention.is_empty() {
            None
        } else {
            Some(retention)
        };
    } else {
        repo.retention = None;
    }

    repo.pre_backup = prompt_optional_path("Pre-backup hook", repo.pre_backup)?;
    repo.post_backup = prompt_optional_path("Post-backup hook", repo.post_backup)?;

    Ok(repo)
}

async fn telegram_settings(cfg: &mut Config) -> Result<()> {
    if !prompt_yn("Enable Telegram notifications? [y]: ", true)? {
        cfg.settings.telegram = None;
        println!("  ✓ Notifications disabled");
        return Ok(());
    }

    let token = loop {
        let input = prompt("Bot token: ", "")?;
        if input.is_empty() {
            continue;
        }
        // Expected shape: digits:alphanumeric
        if !input.contains(':') || input.len() < 20 {
            println!("  ❌ Invalid format. Expected format: 123456:ABC-DEF...");
            continue;
        }
        match crate::telegram::validate_token(&input).await {
            Ok(bot_name) => {
                println!("  ✓ Connected to @{}", bot_name);
                break input;
            }
            Err(e) => {
                println!("  ❌ Failed: {}", e);
                continue;
            }
        }
    };

    let chat_id: i64 = loop {
        let input = prompt("Chat ID: ", "")?;
        match input.parse() {
            Ok(id) => break id,
            Err(_) => {
                println!("  ❌ Must be a number");
                continue;
            }
        }
    };

    cfg.settings.telegram = Some(TelegramSettings { token, chat_id });
    Ok(())
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Helper: prompt for input with default
pub(crate) fn prompt(question: &str, default: &str) -> Result<String> {
    use std::io::{self, Write};
    print!("  {}", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input.to_string())
    }
}

fn prompt_with_default(label: &str, current: &str) -> Result<String> {
    if current.is_empty() {
        prompt(&format!("{}: ", label), "")
    } else {
        prompt(&format!("{} [{}]: ", label, current), current)
    }
}

/// Helper: prompt for yes/no
fn prompt_yn(question: &str, default: bool) -> Result<bool> {
    let input = prompt(question, if default { "y" } else { "n" })?;
    Ok(matches!(input.to_lowercase().as_str(), "y" | "yes"))
}

/// Empty input keeps the bucket unset
fn prompt_count(label: &str, current: Option<u32>) -> Result<Option<u32>> {
    let default = current.map(|c| c.to_string()).unwrap_or_default();
    let shown = if default.is_empty() { "-" } else { default.as_str() };
    let input = prompt(&format!("{} [{}]: ", label, shown), &default)?;
    if input.is_empty() || input == "-" {
        return Ok(None);
    }
    match input.parse() {
        Ok(n) => Ok(Some(n)),
        Err(_) => {
            println!("  ⚠ Not a number, leaving unset");
            Ok(None)
        }
    }
}

fn prompt_optional_path(label: &str, current: Option<PathBuf>) -> Result<Option<PathBuf>> {
    let default = current
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let shown = if default.is_empty() { "none" } else { default.as_str() };
    let input = prompt(&format!("{} [{}]: ", label, shown), &default)?;
    if input.is_empty() || input == "none" {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(input)))
    }
}
