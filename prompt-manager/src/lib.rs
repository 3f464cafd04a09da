//! Prompt rendering: resolves a vendor template, scans it for
//! `{{VAR:name}}` placeholders, and fills each from caller-supplied
//! variables or org-scoped chunk storage (spec §4.3).

pub mod chunk_source;
pub mod context;
pub mod error;
pub mod placeholder;
pub mod template;

use std::collections::HashMap;

use chunk_source::ChunkResolver;
use context::RenderContext;
use error::{Error, Result};
use template::{EncryptedTemplate, PlaintextRegistry};

/// Identifier used for chunk lookups when no application context matched
/// and none was auto-created (spec §4.3 "auto-create at caller's
/// specificity"); kept distinct from a real context id so a cache can tell
/// the two apart.
const UNSCOPED_APP_CTX: &str = "default";

pub struct PromptRenderer<'a, R: ChunkResolver> {
    resolver: &'a R,
    registry: PlaintextRegistry,
}

impl<'a, R: ChunkResolver> PromptRenderer<'a, R> {
    pub fn new(resolver: &'a R, registry: PlaintextRegistry) -> Self {
        Self { resolver, registry }
    }

    /// Renders `prompt_key` for `ctx`, substituting placeholders with
    /// `extra_vars` first and chunk storage second (spec §4.3 steps 1-5):
    /// 1. resolve the application context
    /// 2. load the template body (decrypting if needed)
    /// 3. scan it for placeholders
    /// 4. resolve each placeholder's value
    /// 5. substitute in textual order, caching repeats of the same name
    pub async fn render(
        &self,
        ctx: &RenderContext,
        prompt_key: &str,
        encrypted: Option<&EncryptedTemplate>,
        extra_vars: &HashMap<String, String>,
    ) -> Result<String> {
        let app_ctx = chunk_source::resolve_context(self.resolver, ctx)
            .await?
            .map(|c| c.id)
            .unwrap_or_else(|| UNSCOPED_APP_CTX.to_string());

        let body = template::load_body(prompt_key, encrypted, &self.registry)?;
        let placeholders = placeholder::scan(&body);

        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut out = String::with_capacity(body.len());
        let mut cursor = 0usize;

        for ph in &placeholders {
            let start = body[cursor..]
                .find(ph.full_match.as_str())
                .ok_or_else(|| {
                    Error::MalformedPlaceholder(format!(
                        "placeholder {} not found after cursor {cursor}",
                        ph.full_match
                    ))
                })?
                + cursor;
            out.push_str(&body[cursor..start]);

            let value = match resolved.get(&ph.name) {
                Some(v) => v.clone(),
                None => {
                    let v = self.resolve_value(&ctx.org_id, &app_ctx, prompt_key, ph, extra_vars).await?;
                    resolved.insert(ph.name.clone(), v.clone());
                    v
                }
            };
            out.push_str(&value);
            cursor = start + ph.full_match.len();
        }
        out.push_str(&body[cursor..]);

        Ok(out)
    }

    async fn resolve_value(
        &self,
        org_id: &str,
        app_ctx: &str,
        prompt_key: &str,
        ph: &placeholder::Placeholder,
        extra_vars: &HashMap<String, String>,
    ) -> Result<String> {
        if let Some(v) = extra_vars.get(&ph.name) {
            return Ok(v.clone());
        }

        let chunks = self
            .resolver
            .chunks(org_id, app_ctx, prompt_key, &ph.name)
            .await
            .map_err(|e| Error::ChunkSource(e.to_string()))?;

        if chunks.is_empty() {
            return ph.default.clone().ok_or_else(|| {
                Error::ChunkSource(format!("no chunks for placeholder {}", ph.name))
            });
        }

        Ok(chunks
            .iter()
            .map(|c| c.body.as_str())
            .collect::<Vec<_>>()
            .join(&ph.join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_source::test_support::InMemoryResolver;
    use chunk_source::ChunkBody;

    fn render_ctx() -> RenderContext {
        RenderContext {
            org_id: "acme".to_string(),
            ai_connector: None,
            integration_token: None,
            repository: None,
        }
    }

    #[tokio::test]
    async fn extra_vars_take_priority_over_chunks() {
        let resolver = InMemoryResolver::default();
        resolver.chunks.lock().unwrap().insert(
            ("acme".into(), UNSCOPED_APP_CTX.into(), "review.default".into(), "greeting".into()),
            vec![ChunkBody { id: "1".into(), sequence_index: 1, body: "from chunk".into() }],
        );
        let mut registry = PlaintextRegistry::new();
        registry.insert("review.default", "hi {{VAR:greeting}}");

        let renderer = PromptRenderer::new(&resolver, registry);
        let mut extra = HashMap::new();
        extra.insert("greeting".to_string(), "from var".to_string());

        let out = renderer
            .render(&render_ctx(), "review.default", None, &extra)
            .await
            .unwrap();
        assert_eq!(out, "hi from var");
    }

    #[tokio::test]
    async fn joins_multiple_chunks_with_custom_separator() {
        let resolver = InMemoryResolver::default();
        resolver.chunks.lock().unwrap().insert(
            ("acme".into(), UNSCOPED_APP_CTX.into(), "review.default".into(), "rules".into()),
            vec![
                ChunkBody { id: "1".into(), sequence_index: 1, body: "rule one".into() },
                ChunkBody { id: "2".into(), sequence_index: 2, body: "rule two".into() },
            ],
        );
        let mut registry = PlaintextRegistry::new();
        registry.insert("review.default", r#"{{VAR:rules|join="; "}}"#);

        let renderer = PromptRenderer::new(&resolver, registry);
        let out = renderer
            .render(&render_ctx(), "review.default", None, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(out, "rule one; rule two");
    }

    #[tokio::test]
    async fn falls_back_to_default_when_no_chunks_and_no_var() {
        let resolver = InMemoryResolver::default();
        let mut registry = PlaintextRegistry::new();
        registry.insert("review.default", r#"{{VAR:missing|default="n/a"}}"#);

        let renderer = PromptRenderer::new(&resolver, registry);
        let out = renderer
            .render(&render_ctx(), "review.default", None, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(out, "n/a");
    }

    #[tokio::test]
    async fn errors_when_unresolvable_and_no_default() {
        let resolver = InMemoryResolver::default();
        let mut registry = PlaintextRegistry::new();
        registry.insert("review.default", "{{VAR:missing}}");

        let renderer = PromptRenderer::new(&resolver, registry);
        let err = renderer
            .render(&render_ctx(), "review.default", None, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChunkSource(_)));
    }
}
