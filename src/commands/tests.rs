//! Tests for operator commands over a file store.

use super::*;
use crate::cli::{AddArgs, ListArgs, ModeArg, ReleaseAllArgs, ReleaseArgs, ShowArgs, StateArg};
use crate::error::DocLockError;
use crate::lock::ExceptionInfo;
use crate::repository::AcquireOptions;
use tempfile::TempDir;

fn open(temp_dir: &TempDir) -> DynamicRepository {
    let store_dir = temp_dir.path().join("store");
    let config_path = temp_dir.path().join("doclock.yaml");
    std::fs::write(
        &config_path,
        format!(
            "store_dir: {}\ncollection: orders\nunlock_warn_threshold: 2\n",
            store_dir.display()
        ),
    )
    .unwrap();
    open_repository(&config_path, None).unwrap()
}

async fn add(repo: &DynamicRepository, id: &str, data: &str) -> Result<String> {
    add::cmd_add(
        repo,
        AddArgs {
            id: id.to_string(),
            data: data.to_string(),
        },
    )
    .await
}

async fn release_any(repo: &DynamicRepository, id: &str) -> Result<String> {
    release::cmd_release(
        repo,
        ReleaseArgs {
            id: id.to_string(),
            mode: ModeArg::Any,
        },
    )
    .await
}

#[tokio::test]
async fn test_add_and_show() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);

    let out = add(&repo, "o1", r#"{"total": 12}"#).await.unwrap();
    assert!(out.contains("Added entity 'o1'"));

    let out = show::cmd_show(&repo, ShowArgs { id: "o1".to_string() })
        .await
        .unwrap();
    assert!(out.starts_with("o1 [unlocked]"), "{}", out);
    assert!(out.contains("\"total\": 12"), "{}", out);
    assert!(out.contains("Unlocks:     0"), "{}", out);
}

#[tokio::test]
async fn test_add_rejects_bad_data() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);

    for data in ["[1, 2]", "not json", r#"{"lock": {}}"#, r#"{"_id": "x"}"#] {
        let err = add(&repo, "o1", data).await.unwrap_err();
        assert!(matches!(err, DocLockError::UserError(_)), "{}", data);
    }
    assert!(repo.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_show_missing_entity() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);

    let err = show::cmd_show(&repo, ShowArgs { id: "nope".to_string() })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("entity 'nope' not found"));
    assert_eq!(err.exit_code(), crate::exit_codes::USER_ERROR);
}

#[tokio::test]
async fn test_list_by_state() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);
    add(&repo, "free", "{}").await.unwrap();
    add(&repo, "held", "{}").await.unwrap();

    let mut scope = repo
        .pick("held", AcquireOptions::new().actor("worker-7"))
        .await
        .unwrap()
        .unwrap();

    let out = list::cmd_list(&repo, ListArgs { state: None }).await.unwrap();
    assert_eq!(out.lines().count(), 2);
    assert!(out.contains("active by worker-7"), "{}", out);

    let out = list::cmd_list(
        &repo,
        ListArgs {
            state: Some(StateArg::Unlocked),
        },
    )
    .await
    .unwrap();
    assert!(out.contains("free") && !out.contains("held"), "{}", out);

    let out = list::cmd_list(
        &repo,
        ListArgs {
            state: Some(StateArg::Exception),
        },
    )
    .await
    .unwrap();
    assert_eq!(out, "No entities found.\n");

    scope.abandon().await.unwrap();
}

#[tokio::test]
async fn test_status_reports_exceptions_and_chronic_unlocks() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);
    add(&repo, "ok", "{}").await.unwrap();
    add(&repo, "broken", "{}").await.unwrap();

    let out = status::cmd_status(&repo).await.unwrap();
    assert!(out.contains("No issues detected."), "{}", out);

    let mut scope = repo
        .pick("broken", AcquireOptions::new())
        .await
        .unwrap()
        .unwrap();
    scope
        .set_exception(ExceptionInfo::new("PaymentError", "card declined"))
        .await
        .unwrap();

    let out = status::cmd_status(&repo).await.unwrap();
    assert!(out.contains("exception     1"), "{}", out);
    assert!(out.contains("PaymentError: card declined"), "{}", out);

    // Each forced unlock bumps the counter
    release_any(&repo, "broken").await.unwrap();
    let mut again = repo
        .pick("broken", AcquireOptions::new())
        .await
        .unwrap()
        .unwrap();
    release_any(&repo, "broken").await.unwrap();
    again.abandon().await.unwrap();

    let out = status::cmd_status(&repo).await.unwrap();
    assert!(out.contains("force-unlocked 2 or more times"), "{}", out);
}

#[tokio::test]
async fn test_undecodable_entity_is_listed_and_releasable() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);
    add(&repo, "ok", "{}").await.unwrap();
    repo.store()
        .insert(
            serde_json::json!({"_id": "bad", "lock": {"junk": true}})
                .as_object()
                .unwrap()
                .clone(),
        )
        .await
        .unwrap();

    let out = list::cmd_list(&repo, ListArgs { state: None }).await.unwrap();
    assert!(out.starts_with("ok"), "{}", out);
    assert!(out.contains("1 entity(s) could not be decoded:"), "{}", out);
    assert!(out.contains("entity 'bad'"), "{}", out);

    let out = list::cmd_list(
        &repo,
        ListArgs {
            state: Some(StateArg::Exception),
        },
    )
    .await
    .unwrap();
    assert!(out.contains("entity 'bad'"), "{}", out);

    let out = status::cmd_status(&repo).await.unwrap();
    assert!(out.contains("exception     1"), "{}", out);
    assert!(out.contains("could not be decoded"), "{}", out);

    let out = release_any(&repo, "bad").await.unwrap();
    assert!(out.contains("Released lock on 'bad' (was exception)"), "{}", out);

    let out = list::cmd_list(&repo, ListArgs { state: None }).await.unwrap();
    assert!(!out.contains("could not be decoded"), "{}", out);
    assert!(out.contains("bad  unlocked"), "{}", out);
}

#[tokio::test]
async fn test_release_commands() {
    let temp_dir = TempDir::new().unwrap();
    let repo = open(&temp_dir);
    add(&repo, "a", "{}").await.unwrap();
    add(&repo, "b", "{}").await.unwrap();

    let _a = repo.pick("a", AcquireOptions::new()).await.unwrap().unwrap();
    let _b = repo.pick("b", AcquireOptions::new()).await.unwrap().unwrap();

    let out = release::cmd_release(
        &repo,
        ReleaseArgs {
            id: "a".to_string(),
            mode: ModeArg::ExceptionOnly,
        },
    )
    .await
    .unwrap();
    assert!(out.contains("No lock on 'a' matches mode 'exception_only'"), "{}", out);

    let out = release::cmd_release(
        &repo,
        ReleaseArgs {
            id: "a".to_string(),
            mode: ModeArg::LockOnly,
        },
    )
    .await
    .unwrap();
    assert!(out.contains("Released lock on 'a' (was active)"), "{}", out);

    let out = release::cmd_release_all(
        &repo,
        ReleaseAllArgs {
            mode: ModeArg::Any,
        },
    )
    .await
    .unwrap();
    assert_eq!(out, "Released 1 lock(s) with mode 'any'.\n");

    let err = release::cmd_release(
        &repo,
        ReleaseArgs {
            id: "missing".to_string(),
            mode: ModeArg::Any,
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_collection_override() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("doclock.yaml");
    std::fs::write(
        &config_path,
        format!("store_dir: {}\n", temp_dir.path().join("store").display()),
    )
    .unwrap();

    let _repo = open_repository(&config_path, Some("invoices")).unwrap();
    assert!(temp_dir.path().join("store/invoices").is_dir());
    assert!(!temp_dir.path().join("store/entities").exists());

    assert!(matches!(
        open_repository(&config_path, Some("../escape")),
        Err(DocLockError::UserError(_))
    ));
}
