use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::Config;

/// The tool owns exactly one crontab line, recognized by `<binary> backup`.
/// Everything else in the user's crontab is preserved verbatim.
fn managed_entry(schedule: &str, exe: &str, log: &str) -> String {
    format!("{} {} backup >> {} 2>&1", schedule, exe, log)
}

fn is_managed(line: &str, exe: &str) -> bool {
    line.contains(&format!("{} backup", exe))
}

/// Replace the managed line if present, append it otherwise
fn upsert(existing: &str, entry: &str, exe: &str) -> String {
    let mut lines: Vec<&str> = existing
        .lines()
        .filter(|line| !is_managed(line, exe))
        .collect();
    lines.push(entry);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Drop the managed line; reports whether one was found
fn remove(existing: &str, exe: &str) -> (String, bool) {
    let lines: Vec<&str> = existing
        .lines()
        .filter(|line| !is_managed(line, exe))
        .collect();
    let found = lines.len() != existing.lines().count();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    (out, found)
}

/// Five whitespace-separated fields, contents left to cron itself
pub fn schedule_is_valid(schedule: &str) -> bool {
    schedule.split_whitespace().count() == 5
}

fn current_exe() -> Result<String> {
    let exe = std::env::current_exe().context("resolving the resticron binary path")?;
    Ok(exe.display().to_string())
}

/// `crontab -l`; a missing crontab is an empty one
fn read_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .output()
        .context("running crontab -l")?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Ok(String::new())
    }
}

/// Write the whole table back through `crontab -`
fn write_crontab(content: &str) -> Result<()> {
    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .spawn()
        .context("running crontab -")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("crontab rejected the new table ({})", status);
    }
    Ok(())
}

/// Prompt for a schedule and install the backup entry
pub fn set(cfg: &Config) -> Result<()> {
    let schedule = loop {
        let input = crate::config::prompt("Schedule (cron syntax) [0 2 * * *]: ", "0 2 * * *")?;
        if schedule_is_valid(&input) {
            break input;
        }
        println!("  ❌ Expected five fields, e.g. '0 2 * * *'");
    };

    let exe = current_exe()?;
    let entry = managed_entry(&schedule, &exe, &cfg.settings.log_file.display().to_string());
    let table = upsert(&read_crontab()?, &entry, &exe);
    write_crontab(&table)?;

    println!("✓ Scheduled: {}", entry);
    Ok(())
}

/// Print the managed entry, if any
pub fn show() -> Result<()> {
    let exe = current_exe()?;
    let table = read_crontab()?;
    match table.lines().find(|line| is_managed(line, &exe)) {
        Some(line) => println!("{}", line),
        None => println!("No backup schedule installed. Run `resticron crontab` to add one."),
    }
    Ok(())
}

/// Remove the managed entry, leaving the rest of the table alone
pub fn remove_entry() -> Result<()> {
    let exe = current_exe()?;
    let (table, found) = remove(&read_crontab()?, &exe);
    if !found {
        println!("No backup schedule installed.");
        return Ok(());
    }
    write_crontab(&table)?;
    println!("✓ Backup schedule removed");
    Ok(())
}
