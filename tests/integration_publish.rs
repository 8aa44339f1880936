//! Change publisher tests against real git repositories on disk: dirty
//! detection gating, stage-all commits, idempotent remote creation, and the
//! review push with per-ref result parsing.

use blobup::git::GitRepo;
use blobup::git::command_builder::GitCommand;
use std::path::Path;
use tempfile::TempDir;

async fn git(dir: &Path, args: &[&str]) {
    GitCommand::new()
        .args(args.iter().copied())
        .current_dir(dir)
        .execute_success()
        .await
        .unwrap();
}

async fn init_repo(dir: &Path) -> GitRepo {
    git(dir, &["init", "-b", "main"]).await;
    git(dir, &["config", "user.email", "tester@example.com"]).await;
    git(dir, &["config", "user.name", "Tester"]).await;
    GitRepo::new(dir)
}

#[tokio::test]
async fn test_dirty_tree_gates_the_run() {
    let root = TempDir::new().unwrap();
    let repo = init_repo(root.path()).await;

    // Clean tree: the run may proceed.
    assert!(!repo.is_dirty().await.unwrap());

    // Untracked files count as dirty, exactly like modified tracked ones.
    std::fs::write(root.path().join("wip.txt"), "work in progress").unwrap();
    assert!(repo.is_dirty().await.unwrap());

    repo.commit_all("cupid: Update blobs and firmware from OS1.0.10.0VNBCNXM")
        .await
        .unwrap();
    assert!(!repo.is_dirty().await.unwrap());

    std::fs::write(root.path().join("wip.txt"), "modified").unwrap();
    assert!(repo.is_dirty().await.unwrap());
}

#[tokio::test]
async fn test_commit_message_format() {
    let root = TempDir::new().unwrap();
    let repo = init_repo(root.path()).await;
    std::fs::write(root.path().join("proprietary-files.txt"), "blob\n").unwrap();

    repo.commit_all("zeus: Update blobs and firmware from OS2.0.1.0VNBMIXM")
        .await
        .unwrap();

    let subject = GitCommand::new()
        .args(["log", "--format=%s", "-1"])
        .current_dir(root.path())
        .execute_stdout()
        .await
        .unwrap();
    assert_eq!(subject, "zeus: Update blobs and firmware from OS2.0.1.0VNBMIXM");
}

#[tokio::test]
async fn test_review_push_round_trip() {
    let root = TempDir::new().unwrap();

    // Bare repository standing in for the review endpoint.
    let review = root.path().join("review.git");
    std::fs::create_dir_all(&review).unwrap();
    git(&review, &["init", "--bare"]).await;

    let tree = root.path().join("device");
    std::fs::create_dir_all(&tree).unwrap();
    let repo = init_repo(&tree).await;
    std::fs::write(tree.join("BoardConfig.mk"), "VENDOR_SECURITY_PATCH := 2024-07-01\n")
        .unwrap();
    repo.commit_all("cupid: Update blobs and firmware from OS1.0.10.0VNBCNXM")
        .await
        .unwrap();

    // Remote creation is idempotent across runs.
    let url = review.display().to_string();
    repo.ensure_remote("lineage", &url).await.unwrap();
    repo.ensure_remote("lineage", &url).await.unwrap();
    assert_eq!(repo.remotes().await.unwrap(), vec!["lineage".to_string()]);

    let reports = repo.push_for_review("lineage", "lineage-23.0").await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_rejected());
    assert!(reports[0].refspec.contains("refs/for/lineage-23.0"));

    // The review ref exists on the remote now.
    let refs = GitCommand::new()
        .args(["for-each-ref", "--format=%(refname)", "refs/for"])
        .current_dir(&review)
        .execute_stdout()
        .await
        .unwrap();
    assert_eq!(refs, "refs/for/lineage-23.0");

    // Pushing the same head again is reported per ref, not as a failure.
    let reports = repo.push_for_review("lineage", "lineage-23.0").await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_rejected());
}

#[tokio::test]
async fn test_push_to_unreachable_remote_fails() {
    let root = TempDir::new().unwrap();
    let repo = init_repo(root.path()).await;
    std::fs::write(root.path().join("file.txt"), "data").unwrap();
    repo.commit_all("cupid: Update blobs and firmware from OS1.0.10.0VNBCNXM")
        .await
        .unwrap();

    repo.ensure_remote("lineage", "/nonexistent/review.git").await.unwrap();
    assert!(repo.push_for_review("lineage", "lineage-23.0").await.is_err());
}
