use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use reflens::errors::ReflensError;
use reflens::hover::{resolve_hover, HoverOptions};
use reflens::revision::{GitCli, GixLookup, RevisionLookup};
use reflens::types::HoverKind;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Creates a repository with one commit and returns it with the commit hash.
fn repo_with_commit() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    fs::write(dir.path().join("notes.md"), "hello\n").unwrap();
    git(dir.path(), &["add", "notes.md"]);
    git(
        dir.path(),
        &[
            "commit",
            "-q",
            "-m",
            "Add release notes",
            "-m",
            "Covers the hover work.",
        ],
    );
    let hash = git(dir.path(), &["rev-parse", "HEAD"]);
    (dir, hash)
}

#[test]
fn test_git_cli_resolves_commit() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (dir, hash) = repo_with_commit();
    let cli = GitCli::new(Duration::from_secs(10));

    let info = cli.lookup(dir.path(), &hash[..7]).unwrap();
    assert_eq!(info.subject(), "Add release notes");
    assert_eq!(info.message, "Add release notes\n\nCovers the hover work.");
    assert!(info.relative_time.ends_with("ago"));
}

#[test]
fn test_git_cli_unknown_revision_fails() {
    if !git_available() {
        return;
    }
    let (dir, _) = repo_with_commit();
    let cli = GitCli::new(Duration::from_secs(10));
    let err = cli.message(dir.path(), "a1b2c3d4").unwrap_err();
    assert!(matches!(err, ReflensError::Revision { .. }));
}

#[test]
fn test_git_cli_outside_repository_fails() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let cli = GitCli::new(Duration::from_secs(10));
    assert!(cli.relative_time(dir.path(), "a1b2c3d4").is_err());
}

#[test]
fn test_gix_matches_git_cli() {
    if !git_available() {
        return;
    }
    let (dir, hash) = repo_with_commit();
    let cli = GitCli::new(Duration::from_secs(10));

    let from_gix = GixLookup.message(dir.path(), &hash[..8]).unwrap();
    let from_cli = cli.message(dir.path(), &hash[..8]).unwrap();
    assert_eq!(from_gix, from_cli);
    assert!(GixLookup
        .relative_time(dir.path(), &hash)
        .unwrap()
        .ends_with("ago"));
    assert!(GixLookup.message(dir.path(), "a1b2c3d4").is_err());
}

#[test]
fn test_hover_against_real_repository() {
    if !git_available() {
        return;
    }
    let (dir, hash) = repo_with_commit();
    let cli = GitCli::new(Duration::from_secs(10));
    let opts = HoverOptions::default();
    let text = format!("shipped in {} and tracked as deadbeef00", &hash[..10]);

    let hover = resolve_hover(&text, 12, Some(dir.path()), &cli, &opts).unwrap();
    assert_eq!(hover.kind, HoverKind::Revision);
    assert!(hover.title.contains(&format!("`{}`", &hash[..7])));
    assert!(hover.body.contains("Add release notes"));

    let offset = text.find("deadbeef00").unwrap();
    let hover = resolve_hover(&text, offset, Some(dir.path()), &cli, &opts).unwrap();
    assert_eq!(hover.kind, HoverKind::Fallback);
}

#[test]
fn test_blob_hash_is_not_a_revision() {
    if !git_available() {
        return;
    }
    let (dir, _) = repo_with_commit();
    let blob = git(dir.path(), &["rev-parse", "HEAD:notes.md"]);
    let cli = GitCli::new(Duration::from_secs(10));

    assert!(cli.message(dir.path(), &blob).is_err());
    assert!(cli.relative_time(dir.path(), &blob).is_err());
    assert!(GixLookup.message(dir.path(), &blob).is_err());

    let text = format!("blob {}", blob);
    let opts = HoverOptions::default();
    for lookup in [&cli as &dyn RevisionLookup, &GixLookup] {
        let hover = resolve_hover(&text, 6, Some(dir.path()), lookup, &opts).unwrap();
        assert_eq!(hover.kind, HoverKind::Fallback);
        assert!(!hover.body.contains("hello"));
    }
}

#[cfg(unix)]
#[test]
fn test_hanging_git_times_out() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let script = dir.path().join("slow-git");
    fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let cli = GitCli::new(Duration::from_millis(200)).with_program(script.display().to_string());
    let started = Instant::now();
    let err = cli.message(dir.path(), "a1b2c3d4").unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(err.to_string().contains("timed out"));

    let hover = resolve_hover(
        "a1b2c3d4",
        0,
        Some(dir.path()),
        &cli,
        &HoverOptions::default(),
    )
    .unwrap();
    assert_eq!(hover.kind, HoverKind::Fallback);
}
