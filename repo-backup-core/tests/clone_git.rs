// Clones local repositories with the real git binary. Skipped when git is missing.

use std::path::Path;
use std::process::Command;

use repo_backup_core::clone::GitCloner;
use repo_backup_core::contract::{CloneResult, Cloner};
use tempfile::tempdir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Backup Test", "-c", "user.email=backup@example.com"])
        .args(args)
        .output()
        .expect("git should run");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn source_repo(dir: &Path) -> String {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet"]);
    std::fs::write(dir.join("README.md"), "# source\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "--quiet", "-m", "initial"]);
    git(dir, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn clones_a_repository_and_reports_its_head() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let work = tempdir().unwrap();
    let source = work.path().join("source");
    let head = source_repo(&source);
    let destination = work.path().join("backup-1/octo/source");

    let result = GitCloner::new()
        .clone_repository(&source.to_string_lossy(), &destination, "")
        .await;

    assert_eq!(result, CloneResult::Succeeded { head: Some(head) });
    assert!(destination.join("README.md").exists());
    assert!(destination.join(".git").is_dir());
}

#[tokio::test]
async fn empty_remote_succeeds_without_a_head() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let work = tempdir().unwrap();
    let source = work.path().join("empty");
    std::fs::create_dir_all(&source).unwrap();
    git(&source, &["init", "--quiet"]);
    let destination = work.path().join("backup-1/octo/empty");

    let result = GitCloner::new()
        .clone_repository(&source.to_string_lossy(), &destination, "")
        .await;

    assert_eq!(result, CloneResult::Succeeded { head: None });
}

#[tokio::test]
async fn missing_remote_fails_only_that_job() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let work = tempdir().unwrap();
    let destination = work.path().join("backup-1/octo/missing");

    let result = GitCloner::new()
        .clone_repository(
            &work.path().join("no-such-repo").to_string_lossy(),
            &destination,
            "",
        )
        .await;

    assert!(matches!(result, CloneResult::Failed(msg) if msg.contains("git clone exited")));
}

#[tokio::test]
async fn file_in_the_way_of_the_destination_fails() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let work = tempdir().unwrap();
    let source = work.path().join("source");
    source_repo(&source);
    let destination = work.path().join("backup-1/octo/source");
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, "not a directory").unwrap();

    let result = GitCloner::new()
        .clone_repository(&source.to_string_lossy(), &destination, "")
        .await;

    assert!(matches!(result, CloneResult::Failed(_)));
}
