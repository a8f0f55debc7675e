//! External-collaborator interfaces.
//!
//! Everything outside the voice core (identity, the document database, blob
//! storage, the hosted document-parsing service) is consumed through
//! these traits. Implementations are injected by the application layer; the
//! core never initializes or reaches into a backend client of its own.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The signed-in user, as far as the core needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Supplies the currently signed-in user, if any.
pub trait CurrentUserProvider: Send + Sync {
    fn current_user(&self) -> Option<UserAccount>;
}

/// Invoked with the new document value on every change.
pub type ChangeHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A live document subscription. Dropping the handle releases it, so a
/// subscription can never outlive the scope that acquired it.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Releases explicitly; equivalent to dropping.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing document subscription");
            release();
        }
    }
}

/// Document database access, keyed by slash-separated paths.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>>;
    async fn add(&self, path: &str, data: Value) -> Result<()>;
    async fn update(&self, path: &str, data: Value) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn subscribe(&self, path: &str, on_change: ChangeHandler) -> Result<Subscription>;
}

/// Reports upload progress as a fraction in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Binary object storage for videos and documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        on_progress: Option<ProgressFn>,
    ) -> Result<()>;
    async fn download_url(&self, path: &str) -> Result<String>;
}

/// The hosted parsing service: turns an uploaded file into structured data
/// matching the given JSON Schema. Treated as a black box.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, file: &[u8], target_schema: Value, instructions: &str) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_subscription_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        {
            let released = released.clone();
            let _subscription = Subscription::new(move || {
                released.store(true, Ordering::SeqCst);
            });
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_subscription_explicit_release_fires_once() {
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = count.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscription.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_document_store_round_trip() {
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .withf(|path| path == "users/u1")
            .returning(|_| Ok(Some(serde_json::json!({"name": "Dana"}))));

        let value = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(value["name"], "Dana");
    }

    #[tokio::test]
    async fn test_store_subscription_scoped_to_handle() {
        let released = Arc::new(AtomicBool::new(false));
        let mut store = MockDocumentStore::new();
        {
            let released = released.clone();
            store.expect_subscribe().returning(move |_, on_change| {
                on_change(serde_json::json!({"seq": 1}));
                let released = released.clone();
                Ok(Subscription::new(move || {
                    released.store(true, Ordering::SeqCst);
                }))
            });
        }

        let seen = Arc::new(AtomicBool::new(false));
        let handler: ChangeHandler = {
            let seen = seen.clone();
            Arc::new(move |value| {
                assert_eq!(value["seq"], 1);
                seen.store(true, Ordering::SeqCst);
            })
        };
        let subscription = store.subscribe("jobs/j1", handler).await.unwrap();
        assert!(seen.load(Ordering::SeqCst));
        assert!(!released.load(Ordering::SeqCst));

        drop(subscription);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_mock_blob_store_reports_progress() {
        let mut store = MockBlobStore::new();
        store.expect_upload().returning(|_, _, on_progress| {
            if let Some(on_progress) = on_progress {
                on_progress(0.5);
                on_progress(1.0);
            }
            Ok(())
        });
        store
            .expect_download_url()
            .returning(|path| Ok(format!("https://cdn.example.com/{}", path)));

        let progress = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let on_progress: ProgressFn = {
            let progress = progress.clone();
            Arc::new(move |fraction| progress.lock().push(fraction))
        };
        store
            .upload("videos/v1.mp4", vec![0u8; 16], Some(on_progress))
            .await
            .unwrap();
        assert_eq!(*progress.lock(), vec![0.5, 1.0]);

        let url = store.download_url("videos/v1.mp4").await.unwrap();
        assert!(url.ends_with("videos/v1.mp4"));
    }

    #[test]
    fn test_current_user_provider_as_trait_object() {
        struct FixedUser;
        impl CurrentUserProvider for FixedUser {
            fn current_user(&self) -> Option<UserAccount> {
                Some(UserAccount {
                    id: "u1".to_string(),
                    email: Some("dana@example.com".to_string()),
                    display_name: None,
                })
            }
        }

        let provider: Arc<dyn CurrentUserProvider> = Arc::new(FixedUser);
        let user = provider.current_user().unwrap();
        assert_eq!(user.id, "u1");
    }
}
