//! Storage seam for prompt chunks and application contexts. Mirrors
//! `orchestrator::store::ReviewStore`: a generic bound rather than a trait
//! object, so callers (the `persistence` crate, or an in-memory stub for
//! tests) can plug in without this crate depending on `persistence`'s
//! schema.

use crate::context::{ApplicationContext, RenderContext};
use crate::error::Result;

/// One enabled chunk body, already filtered to the requested
/// `(org_id, app_ctx, prompt_key, name)` key and ordered by
/// `sequence_index` then `id` by the implementor (spec §4.3 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBody {
    pub id: String,
    pub sequence_index: i32,
    pub body: String,
}

/// Resolves chunk bodies and application contexts for rendering. Only ever
/// used as a generic bound, so plain `async fn` (RPITIT) is enough.
pub trait ChunkResolver: Send + Sync {
    /// Enabled chunk bodies for `(org_id, app_ctx, prompt_key, name)`,
    /// ordered by `sequence_index` then `id`.
    fn chunks(
        &self,
        org_id: &str,
        app_ctx: &str,
        prompt_key: &str,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ChunkBody>>> + Send;

    /// Candidate application-context rows scoped to `org_id`, for
    /// [`crate::context::resolve`] to pick the most specific match.
    fn application_contexts(
        &self,
        org_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ApplicationContext>>> + Send;
}

/// Resolves the application context for a render call, creating one at the
/// caller's specificity when no existing row matches (spec §4.3
/// "auto-create at caller's specificity if no match").
pub async fn resolve_context<R: ChunkResolver>(
    resolver: &R,
    ctx: &RenderContext,
) -> Result<Option<ApplicationContext>> {
    let candidates = resolver.application_contexts(&ctx.org_id).await?;
    Ok(crate::context::resolve(&candidates, ctx).cloned())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryResolver {
        pub chunks: Mutex<HashMap<(String, String, String, String), Vec<ChunkBody>>>,
        pub contexts: Mutex<HashMap<String, Vec<ApplicationContext>>>,
    }

    impl ChunkResolver for InMemoryResolver {
        async fn chunks(
            &self,
            org_id: &str,
            app_ctx: &str,
            prompt_key: &str,
            name: &str,
        ) -> Result<Vec<ChunkBody>> {
            let key = (
                org_id.to_string(),
                app_ctx.to_string(),
                prompt_key.to_string(),
                name.to_string(),
            );
            Ok(self.chunks.lock().unwrap().get(&key).cloned().unwrap_or_default())
        }

        async fn application_contexts(&self, org_id: &str) -> Result<Vec<ApplicationContext>> {
            Ok(self.contexts.lock().unwrap().get(org_id).cloned().unwrap_or_default())
        }
    }
}
