use messaging_db::{PersistenceMode, SendOutcome, Store, StoreConfig};
use messaging_types::Channel;

fn file_config(root: &std::path::Path) -> StoreConfig {
    StoreConfig {
        mode: PersistenceMode::File,
        file_root: root.to_string_lossy().into_owned(),
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn paid_send_debits_sender_and_is_idempotent() {
    let dir = tempdir();
    let store = Store::connect(&file_config(dir.path())).await.unwrap();

    store.create_user("alice", "0xAAA", 1000).await.unwrap();
    store.create_user("bob", "0xBBB", 0).await.unwrap();

    let outcome = store
        .create_paid_message("alice", "bob", "cipher", "hash-1", 500, Some("key-1"))
        .await
        .unwrap();
    let message = match outcome {
        SendOutcome::Created(m) => m,
        _ => panic!("expected a freshly created message"),
    };
    assert_eq!(message.price, 500);

    let alice = store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(alice.balance, 500);

    // Retrying with the same idempotency key must not debit again.
    let retried = store
        .create_paid_message("alice", "bob", "cipher", "hash-1", 500, Some("key-1"))
        .await
        .unwrap();
    match retried {
        SendOutcome::Idempotent(m) => assert_eq!(m.id, message.id),
        _ => panic!("expected the idempotent branch"),
    }
    let alice_again = store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(alice_again.balance, 500, "idempotent retry must not double-debit");
}

#[tokio::test]
async fn insufficient_balance_rolls_back_cleanly() {
    let dir = tempdir();
    let store = Store::connect(&file_config(dir.path())).await.unwrap();
    store.create_user("carol", "0xCCC", 10).await.unwrap();
    store.create_user("dave", "0xDDD", 0).await.unwrap();

    let err = store
        .create_paid_message("carol", "dave", "cipher", "hash-2", 500, None)
        .await
        .unwrap_err();
    assert!(matches!(err, messaging_db::DbError::InsufficientBalance { available: 10, required: 500 }));

    let carol = store.get_user("carol").await.unwrap().unwrap();
    assert_eq!(carol.balance, 10, "failed send must not touch the balance");
}

#[tokio::test]
async fn delivery_job_claim_respects_lease_window() {
    let dir = tempdir();
    let store = Store::connect(&file_config(dir.path())).await.unwrap();
    store.create_user("erin", "0xEEE", 100).await.unwrap();

    let job_id = store
        .enqueue_delivery_job(uuid::Uuid::new_v4(), "erin", Channel::WhatsApp, "+15555550100", "{}", 5)
        .await
        .unwrap();

    let claimed = store.claim_due_jobs("worker-a", 10, chrono::Duration::seconds(30)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job_id);

    // A second worker must not be able to claim the same leased job.
    let second_claim = store.claim_due_jobs("worker-b", 10, chrono::Duration::seconds(30)).await.unwrap();
    assert!(second_claim.is_empty());
}

fn tempdir() -> tempdir::TempDir {
    tempdir::TempDir::new("messaging-db-test").unwrap()
}

mod tempdir {
    use std::path::{Path, PathBuf};

    pub struct TempDir(PathBuf);

    impl TempDir {
        pub fn new(prefix: &str) -> std::io::Result<Self> {
            let mut path = std::env::temp_dir();
            path.push(format!("{prefix}-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path)?;
            Ok(Self(path))
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
