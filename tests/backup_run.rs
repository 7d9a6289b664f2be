use resticron::backup::{self, HookOverrides};
use resticron::config::{Config, Repository, Retention};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A stand-in restic that records its argv and environment, then exits
fn stub_restic(dir: &Path, exit_code: i32) -> (PathBuf, PathBuf) {
    let log = dir.join("restic-calls.log");
    let bin = dir.join("restic");
    write_script(
        &bin,
        &format!(
            "#!/bin/sh\necho \"$@\" >> {log}\necho \"repo=$RESTIC_REPOSITORY pw=$RESTIC_PASSWORD\" >> {log}\nexit {code}\n",
            log = log.display(),
            code = exit_code
        ),
    );
    (bin, log)
}

fn test_config(dir: &Path, restic_bin: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.settings.restic_bin = restic_bin.display().to_string();
    cfg.settings.log_file = dir.join("resticron.log");
    cfg.repositories.push(Repository {
        name: "home".to_string(),
        destination: dir.join("repo").display().to_string(),
        password: "secret".to_string(),
        paths: vec![dir.join("data").display().to_string()],
        exclude: vec!["*.tmp".to_string()],
        retention: None,
        pre_backup: None,
        post_backup: None,
    });
    cfg
}

#[tokio::test]
async fn backup_invokes_restic_with_composed_args_and_env() {
    let temp = tempdir().unwrap();
    let (bin, log) = stub_restic(temp.path(), 0);
    let cfg = test_config(temp.path(), &bin);

    backup::run(&cfg, Some("home"), &HookOverrides::default())
        .await
        .unwrap();

    let calls = fs::read_to_string(&log).unwrap();
    let mut lines = calls.lines();

    let argv = lines.next().unwrap();
    assert!(argv.starts_with("backup "));
    assert!(argv.contains(&temp.path().join("data").display().to_string()));
    assert!(argv.contains("--exclude *.tmp"));

    let env = lines.next().unwrap();
    assert!(env.contains(&format!("repo={}", temp.path().join("repo").display())));
    assert!(env.contains("pw=secret"));
}

#[tokio::test]
async fn retention_policy_runs_forget_after_backup() {
    let temp = tempdir().unwrap();
    let (bin, log) = stub_restic(temp.path(), 0);
    let mut cfg = test_config(temp.path(), &bin);
    cfg.repositories[0].retention = Some(Retention {
        last: Some(3),
        daily: Some(7),
        weekly: None,
        monthly: None,
    });

    backup::run(&cfg, Some("home"), &HookOverrides::default())
        .await
        .unwrap();

    let calls = fs::read_to_string(&log).unwrap();
    let forget = calls
        .lines()
        .find(|l| l.starts_with("forget"))
        .expect("forget should run after backup");
    assert_eq!(forget, "forget --keep-last 3 --keep-daily 7 --prune");
}

#[tokio::test]
async fn failing_restic_counts_as_a_failed_repository() {
    let temp = tempdir().unwrap();
    let (bin, _log) = stub_restic(temp.path(), 1);
    let cfg = test_config(temp.path(), &bin);

    let err = backup::run(&cfg, Some("home"), &HookOverrides::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 of 1 backups failed"));
}

#[tokio::test]
async fn aggregate_run_continues_past_failures() {
    let temp = tempdir().unwrap();
    let (good, log) = stub_restic(temp.path(), 0);

    // A second repository pointing at a restic that always fails
    let bad_dir = temp.path().join("bad");
    fs::create_dir_all(&bad_dir).unwrap();
    let (_bad, _) = stub_restic(&bad_dir, 1);

    let mut cfg = test_config(temp.path(), &good);
    cfg.repositories.insert(
        0,
        Repository {
            name: "broken".to_string(),
            destination: "sftp:nowhere:repo".to_string(),
            password: "x".to_string(),
            paths: vec!["/does-not-matter".to_string()],
            exclude: vec![],
            retention: None,
            // Failing pre-hook, so this repository never reaches restic
            pre_backup: Some(bad_dir.join("restic")),
            post_backup: None,
        },
    );

    let err = backup::run(&cfg, None, &HookOverrides::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 of 2 backups failed"));

    // The healthy repository still ran
    let calls = fs::read_to_string(&log).unwrap();
    assert!(calls.lines().any(|l| l.starts_with("backup ")));
}

#[tokio::test]
async fn failing_pre_hook_aborts_before_restic_runs() {
    let temp = tempdir().unwrap();
    let (bin, log) = stub_restic(temp.path(), 0);
    let mut cfg = test_config(temp.path(), &bin);

    let hook = temp.path().join("pre.sh");
    write_script(&hook, "#!/bin/sh\nexit 1\n");
    cfg.repositories[0].pre_backup = Some(hook);

    backup::run(&cfg, Some("home"), &HookOverrides::default())
        .await
        .unwrap_err();
    assert!(!log.exists(), "restic must not run after a failed pre-hook");
}

#[tokio::test]
async fn cli_hooks_override_configured_ones() {
    let temp = tempdir().unwrap();
    let (bin, _log) = stub_restic(temp.path(), 0);
    let mut cfg = test_config(temp.path(), &bin);

    let configured_marker = temp.path().join("configured");
    let configured = temp.path().join("configured.sh");
    write_script(
        &configured,
        &format!("#!/bin/sh\ntouch {}\n", configured_marker.display()),
    );
    cfg.repositories[0].post_backup = Some(configured);

    let override_marker = temp.path().join("override");
    let override_hook = temp.path().join("override.sh");
    write_script(
        &override_hook,
        &format!("#!/bin/sh\necho \"$1\" > {}\n", override_marker.display()),
    );

    let overrides = HookOverrides {
        pre: None,
        post: Some(override_hook),
    };
    backup::run(&cfg, Some("home"), &overrides).await.unwrap();

    assert!(!configured_marker.exists());
    assert_eq!(
        fs::read_to_string(&override_marker).unwrap().trim(),
        "home"
    );
}
