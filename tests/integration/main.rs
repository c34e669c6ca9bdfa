//! Integration tests for valnotes

use std::path::Path;
use std::process::Command as StdCommand;
use tempfile::TempDir;

/// Create a git repository with a committer identity
fn git_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    dir
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

mod cli_tests {
    use super::*;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn valnotes(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("valnotes");
        cmd.current_dir(dir)
            .arg("--no-local")
            .arg("--config")
            .arg(dir.join("no-such-config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("validation cache"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("valnotes"));
    }

    #[test]
    fn tree_hash_of_empty_repository_is_empty_tree() {
        let repo = git_repo();
        valnotes(repo.path())
            .arg("tree-hash")
            .assert()
            .success()
            .stdout("4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
    }

    #[test]
    fn tree_hash_outside_repository_is_not_applicable() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .args(["tree-hash", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("notApplicable"));
    }

    #[test]
    fn record_then_state_reports_cached() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");
        let outcome = repo.path().join("outcome.json");
        std::fs::write(&outcome, r#"{"passed": true}"#).unwrap();
        // Keep the outcome file itself out of the fingerprint
        write(repo.path(), ".gitignore", "outcome.json\n");

        valnotes(repo.path())
            .args(["record", "--format", "json", "--outcome"])
            .arg(&outcome)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"recorded\": true"));

        valnotes(repo.path())
            .args(["state", "--format", "plain"])
            .assert()
            .success()
            .stdout("passed\n");
    }

    #[test]
    fn record_reads_outcome_from_stdin() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");

        valnotes(repo.path())
            .args(["record", "--format", "plain"])
            .write_stdin(r#"{"passed": false}"#)
            .assert()
            .success();

        valnotes(repo.path())
            .args(["history", "show", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(" failed "));
    }

    #[test]
    fn record_with_stale_tree_hash_is_skipped() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");

        let stale = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
        valnotes(repo.path())
            .args(["record", "--format", "json", "--tree-hash", stale])
            .write_stdin(r#"{"passed": true}"#)
            .assert()
            .success()
            .stdout(predicate::str::contains("tree-changed"));

        valnotes(repo.path())
            .args(["history", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout("");
    }

    #[test]
    fn state_outside_repository_is_uncached() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .args(["state", "--format", "plain"])
            .assert()
            .success()
            .stdout("uncached\n");
    }

    #[test]
    fn history_show_outside_repository_fails_with_hint() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .args(["history", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not a git working tree"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_category_is_rejected() {
        let repo = git_repo();
        valnotes(repo.path())
            .args(["history", "list", "--category", "Bad/Name"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid category name"));
    }

    #[test]
    fn health_and_prune_on_empty_store() {
        let repo = git_repo();
        valnotes(repo.path())
            .args(["history", "health", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"totalNotes\": 0"));

        valnotes(repo.path())
            .args(["history", "prune", "--dry-run", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"dryRun\": true"));
    }

    #[test]
    fn config_path_honours_flag() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("no-such-config.toml"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let dir = TempDir::new().unwrap();
        valnotes(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[history]"))
            .stdout(predicate::str::contains("max_append_attempts = 10"));
    }

    #[test]
    fn config_set_local_is_picked_up() {
        let dir = TempDir::new().unwrap();
        let mut cmd = cargo_bin_cmd!("valnotes");
        cmd.current_dir(dir.path())
            .args(["config", "set", "--local", "prune.max_age_days", "7"])
            .assert()
            .success();

        let mut cmd = cargo_bin_cmd!("valnotes");
        cmd.current_dir(dir.path())
            .arg("--config")
            .arg(dir.path().join("no-such-config.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_age_days = 7"));
    }
}

mod fingerprint_tests {
    use super::*;
    use valnotes::fingerprint::{fingerprint, Fingerprint, EMPTY_TREE};

    async fn known(dir: &Path) -> String {
        match fingerprint(dir).await {
            Fingerprint::Known(tree) => tree.to_string(),
            Fingerprint::NotApplicable => panic!("expected a fingerprint for {}", dir.display()),
        }
    }

    #[tokio::test]
    async fn fresh_repository_hashes_to_empty_tree() {
        let repo = git_repo();
        assert_eq!(known(repo.path()).await, EMPTY_TREE);
    }

    #[tokio::test]
    async fn fingerprint_is_deterministic() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "hello");

        assert_eq!(known(repo.path()).await, known(repo.path()).await);
    }

    #[tokio::test]
    async fn untracked_edits_and_deletions_change_fingerprint() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");
        write(repo.path(), "b.txt", "keep");
        git(repo.path(), &["add", "."]);
        git(repo.path(), &["commit", "-q", "-m", "init"]);
        let committed = known(repo.path()).await;
        assert_eq!(committed, git(repo.path(), &["rev-parse", "HEAD^{tree}"]));

        write(repo.path(), "new.txt", "untracked");
        let with_untracked = known(repo.path()).await;
        assert_ne!(with_untracked, committed);

        std::fs::remove_file(repo.path().join("new.txt")).unwrap();
        std::fs::remove_file(repo.path().join("b.txt")).unwrap();
        let with_deletion = known(repo.path()).await;
        assert_ne!(with_deletion, committed);
        assert_ne!(with_deletion, with_untracked);
    }

    #[tokio::test]
    async fn ignored_files_do_not_change_fingerprint() {
        let repo = git_repo();
        write(repo.path(), ".gitignore", "*.log\n");
        write(repo.path(), "a.txt", "v1");
        let before = known(repo.path()).await;

        write(repo.path(), "debug.log", "noise");
        assert_eq!(known(repo.path()).await, before);

        std::fs::remove_file(repo.path().join("debug.log")).unwrap();
        assert_eq!(known(repo.path()).await, before);
    }

    #[tokio::test]
    async fn staging_does_not_change_fingerprint() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");
        let unstaged = known(repo.path()).await;

        git(repo.path(), &["add", "a.txt"]);
        let staged = known(repo.path()).await;

        git(repo.path(), &["rm", "--cached", "-q", "a.txt"]);
        let reset = known(repo.path()).await;

        assert_eq!(unstaged, staged);
        assert_eq!(staged, reset);
    }

    #[tokio::test]
    async fn real_index_is_untouched() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");

        known(repo.path()).await;

        assert_eq!(git(repo.path(), &["diff", "--cached", "--name-only"]), "");
        assert_eq!(
            git(repo.path(), &["status", "--porcelain"]),
            "?? a.txt"
        );
    }

    #[tokio::test]
    async fn outside_repository_is_not_applicable() {
        let dir = TempDir::new().unwrap();
        assert_eq!(fingerprint(dir.path()).await, Fingerprint::NotApplicable);
    }
}

mod cache_tests {
    use super::*;
    use std::sync::Arc;
    use valnotes::config::Config;
    use valnotes::fingerprint::{Fingerprint, TreeHash};
    use valnotes::history::{detect_flakiness, most_recent, ValidationOutcome};
    use valnotes::{RecordSkip, ValidationCache};

    fn outcome(passed: bool) -> ValidationOutcome {
        ValidationOutcome {
            passed,
            ..Default::default()
        }
    }

    async fn known(cache: &ValidationCache) -> TreeHash {
        match cache.compute_fingerprint().await {
            Fingerprint::Known(tree) => tree,
            Fingerprint::NotApplicable => panic!("expected a fingerprint"),
        }
    }

    #[tokio::test]
    async fn edit_record_and_read_back() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;

        write(repo.path(), "a.txt", "v1");
        git(repo.path(), &["add", "a.txt"]);
        git(repo.path(), &["commit", "-q", "-m", "v1"]);
        let f1 = known(&cache).await;

        write(repo.path(), "a.txt", "v2");
        let f2 = known(&cache).await;
        assert_ne!(f1, f2);

        for passed in [true, false, true] {
            let result = cache.record_run(&f2, &outcome(passed)).await;
            assert!(result.recorded, "not recorded: {:?}", result.skipped);
        }

        let note = cache.read_history(&f2).await.unwrap();
        assert_eq!(note.runs.len(), 3);
        assert!(most_recent(&note).unwrap().passed);
        assert!(detect_flakiness(&note).flaky);
        assert!(note.runs[0].uncommitted_changes);
        assert!(note.runs[0].head_commit.is_some());

        assert!(cache.read_history(&f1).await.is_none());

        // Recording never touches the working tree or the index
        assert_eq!(known(&cache).await, f2);
        assert_eq!(git(repo.path(), &["status", "--porcelain"]), "M a.txt");
    }

    #[tokio::test]
    async fn stability_detects_mid_run_edit() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        write(repo.path(), "a.txt", "v1");
        let before = cache.compute_fingerprint().await;

        assert!(cache.check_stability(&before).await.stable);

        write(repo.path(), "a.txt", "v2");
        let result = cache.check_stability(&before).await;
        assert!(!result.stable);
        assert_ne!(result.fingerprint_after, before);
    }

    #[tokio::test]
    async fn concurrent_records_are_all_kept() {
        const WRITERS: usize = 6;

        let repo = git_repo();
        write(repo.path(), "a.txt", "shared");
        let mut config = Config::default();
        config.history.max_append_attempts = 40;
        config.history.retry_backoff_ms = 10;

        let cache = Arc::new(ValidationCache::open(repo.path(), config).await);
        let tree = known(&cache).await;

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let tree = tree.clone();
                tokio::spawn(async move { cache.record_run(&tree, &outcome(i % 2 == 0)).await })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.recorded, "lost a record: {:?}", result.skipped);
        }

        let note = cache.read_history(&tree).await.unwrap();
        assert_eq!(note.runs.len(), WRITERS);
        let mut ids: Vec<_> = note.runs.iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), WRITERS);
    }

    #[tokio::test]
    async fn corrupt_note_is_left_alone() {
        let repo = git_repo();
        write(repo.path(), "a.txt", "v1");
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        let tree = known(&cache).await;

        // Fingerprinting already wrote the tree object the note attaches to
        git(
            repo.path(),
            &["notes", "--ref", "valnotes/validation", "add", "-m", "garbage", tree.as_str()],
        );

        let result = cache.record_run(&tree, &outcome(true)).await;

        assert_eq!(result.skipped, Some(RecordSkip::CorruptNote));
        assert!(cache.read_history(&tree).await.is_none());
        assert_eq!(
            git(
                repo.path(),
                &["notes", "--ref", "valnotes/validation", "show", tree.as_str()]
            ),
            "garbage"
        );
    }

    #[tokio::test]
    async fn note_copied_from_another_tree_is_not_history() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        write(repo.path(), "a.txt", "one");
        let first = known(&cache).await;
        write(repo.path(), "a.txt", "two");
        let second = known(&cache).await;
        cache.record_run(&second, &outcome(false)).await;

        let notes_ref = "valnotes/validation";
        let blob = git(repo.path(), &["notes", "--ref", notes_ref, "list", second.as_str()]);
        git(
            repo.path(),
            &["notes", "--ref", notes_ref, "add", "-f", "-C", &blob, first.as_str()],
        );

        let result = cache.record_run(&first, &outcome(true)).await;

        assert_eq!(result.skipped, Some(RecordSkip::CorruptNote));
        assert!(cache.read_history(&first).await.is_none());
        assert_eq!(
            git(repo.path(), &["notes", "--ref", notes_ref, "list", first.as_str()]),
            blob
        );
    }

    #[tokio::test]
    async fn recording_keeps_no_reflog_for_notes_refs() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        write(repo.path(), "a.txt", "one");
        let tree = known(&cache).await;

        for passed in [true, false] {
            assert!(cache.record_run(&tree, &outcome(passed)).await.recorded);
        }

        let log = git(
            repo.path(),
            &["rev-parse", "--git-path", "logs/refs/notes/valnotes/validation"],
        );
        assert!(!repo.path().join(log).exists());
    }

    #[tokio::test]
    async fn prune_is_idempotent() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;

        write(repo.path(), "a.txt", "one");
        let first = known(&cache).await;
        cache.record_run(&first, &outcome(true)).await;
        write(repo.path(), "a.txt", "two");
        let second = known(&cache).await;
        cache.record_run(&second, &outcome(false)).await;
        assert_eq!(cache.list_history().await.len(), 2);

        // Nothing is a day old yet
        let kept = cache.prune_by_age(1, true).await;
        assert_eq!(kept.notes_pruned, 0);
        assert_eq!(kept.notes_remaining, 2);

        // Age zero: every note with a run older than "now" is expired
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let dry_a = cache.prune_by_age(0, true).await;
        let dry_b = cache.prune_by_age(0, true).await;
        assert_eq!(dry_a.pruned_tree_hashes, dry_b.pruned_tree_hashes);
        assert_eq!(dry_a.notes_pruned, 2);
        assert_eq!(cache.list_history().await.len(), 2);

        let real = cache.prune_by_age(0, false).await;
        assert_eq!(real.notes_pruned, 2);
        assert_eq!(real.runs_pruned, 2);
        assert!(real.failed.is_empty());

        let after = cache.prune_by_age(0, true).await;
        assert_eq!(after.notes_pruned, 0);
        assert_eq!(after.notes_remaining, real.notes_remaining);
        assert!(cache.list_history().await.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_only_one_tree() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        write(repo.path(), "a.txt", "one");
        let first = known(&cache).await;
        cache.record_run(&first, &outcome(true)).await;
        write(repo.path(), "a.txt", "two");
        let second = known(&cache).await;
        cache.record_run(&second, &outcome(true)).await;

        assert!(cache.clear_history(&first).await);
        assert!(!cache.clear_history(&first).await);
        assert!(cache.read_history(&first).await.is_none());
        assert!(cache.read_history(&second).await.is_some());
    }

    #[tokio::test]
    async fn health_counts_notes_and_bytes() {
        let repo = git_repo();
        let cache = ValidationCache::open(repo.path(), Config::default()).await;
        write(repo.path(), "a.txt", "one");
        let tree = known(&cache).await;
        cache.record_run(&tree, &outcome(true)).await;

        let report = cache.check_health().await;

        assert_eq!(report.total_notes, 1);
        assert!(report.total_size_bytes > 0);
        assert_eq!(report.old_note_count, 0);
        assert!(!report.should_warn);
    }
}
