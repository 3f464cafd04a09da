//! Review storage seam. A `persistence`-backed implementation is expected
//! in deployment; [`InMemoryReviewStore`] is the default used by tests and
//! standalone runs (spec §9 "storage is behind a trait, never assumed to be
//! Postgres").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::batch::CancelToken;
use crate::errors::{Error, Result};
use crate::review::{Review, ReviewId};

/// Only ever used as a generic bound (`Orchestrator<S: ReviewStore>`), never
/// as `dyn ReviewStore` — so plain `async fn` in the trait is enough, no
/// boxing helper crate needed.
pub trait ReviewStore: Send + Sync {
    fn insert(&self, review: Review) -> impl std::future::Future<Output = Result<()>> + Send;
    fn update(&self, review: Review) -> impl std::future::Future<Output = Result<()>> + Send;
    fn get(&self, id: ReviewId) -> impl std::future::Future<Output = Result<Option<Review>>> + Send;
    /// Returns this review's cancellation token, creating one on first use.
    fn cancel_token(&self, id: ReviewId) -> CancelToken;
}

#[derive(Default, Clone)]
pub struct InMemoryReviewStore {
    reviews: Arc<RwLock<HashMap<ReviewId, Review>>>,
    tokens: Arc<std::sync::Mutex<HashMap<ReviewId, CancelToken>>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for InMemoryReviewStore {
    async fn insert(&self, review: Review) -> Result<()> {
        self.reviews.write().await.insert(review.id, review);
        Ok(())
    }

    async fn update(&self, review: Review) -> Result<()> {
        let mut guard = self.reviews.write().await;
        if !guard.contains_key(&review.id) {
            return Err(Error::NotFound(format!("review {}", review.id)));
        }
        guard.insert(review.id, review);
        Ok(())
    }

    async fn get(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self.reviews.read().await.get(&id).cloned())
    }

    fn cancel_token(&self, id: ReviewId) -> CancelToken {
        let mut guard = self.tokens.lock().expect("cancel token map poisoned");
        guard.entry(id).or_insert_with(CancelToken::new).clone()
    }
}
