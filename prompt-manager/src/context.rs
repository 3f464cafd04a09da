//! Application-context resolution: most-specific-wins matching over
//! `(org_id, ai_connector?, integration_token?, repository?)`, treating
//! null fields as wildcards (spec §4.3 "Application-context resolution").

use serde::{Deserialize, Serialize};

/// The caller-supplied addressing tuple a render call resolves against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderContext {
    pub org_id: String,
    pub ai_connector: Option<String>,
    pub integration_token: Option<String>,
    pub repository: Option<String>,
}

/// A stored application-context row. `None` fields are wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationContext {
    pub id: String,
    pub org_id: String,
    pub ai_connector: Option<String>,
    pub integration_token: Option<String>,
    pub repository: Option<String>,
}

impl ApplicationContext {
    /// Specificity is the count of non-wildcard fields; used to break ties
    /// between multiple matching rows.
    fn specificity(&self) -> u8 {
        [&self.ai_connector, &self.integration_token, &self.repository]
            .iter()
            .filter(|f| f.is_some())
            .count() as u8
    }

    fn matches(&self, ctx: &RenderContext) -> bool {
        self.org_id == ctx.org_id
            && field_matches(&self.ai_connector, &ctx.ai_connector)
            && field_matches(&self.integration_token, &ctx.integration_token)
            && field_matches(&self.repository, &ctx.repository)
    }
}

fn field_matches(stored: &Option<String>, requested: &Option<String>) -> bool {
    match stored {
        None => true,
        Some(v) => requested.as_deref() == Some(v.as_str()),
    }
}

/// Picks the most-specific row matching `ctx` out of `candidates` (spec
/// §4.3: "pick the most-specific existing row with matching non-null
/// fields"). Ties are broken by the candidates' existing order (callers
/// should supply rows already ordered by `id` for a stable pick).
pub fn resolve<'a>(
    candidates: &'a [ApplicationContext],
    ctx: &RenderContext,
) -> Option<&'a ApplicationContext> {
    candidates
        .iter()
        .filter(|c| c.matches(ctx))
        .max_by_key(|c| c.specificity())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(org: &str, connector: Option<&str>, repo: Option<&str>) -> RenderContext {
        RenderContext {
            org_id: org.to_string(),
            ai_connector: connector.map(String::from),
            integration_token: None,
            repository: repo.map(String::from),
        }
    }

    #[test]
    fn picks_the_most_specific_matching_row() {
        let wildcard = ApplicationContext {
            id: "1".into(),
            org_id: "acme".into(),
            ai_connector: None,
            integration_token: None,
            repository: None,
        };
        let specific = ApplicationContext {
            id: "2".into(),
            org_id: "acme".into(),
            ai_connector: Some("openai".into()),
            integration_token: None,
            repository: None,
        };
        let rows = vec![wildcard, specific];
        let picked = resolve(&rows, &ctx("acme", Some("openai"), None)).unwrap();
        assert_eq!(picked.id, "2");
    }

    #[test]
    fn falls_back_to_wildcard_when_nothing_more_specific_matches() {
        let wildcard = ApplicationContext {
            id: "1".into(),
            org_id: "acme".into(),
            ai_connector: None,
            integration_token: None,
            repository: None,
        };
        let rows = vec![wildcard];
        let picked = resolve(&rows, &ctx("acme", Some("openai"), None)).unwrap();
        assert_eq!(picked.id, "1");
    }

    #[test]
    fn rejects_cross_org_rows() {
        let row = ApplicationContext {
            id: "1".into(),
            org_id: "acme".into(),
            ai_connector: None,
            integration_token: None,
            repository: None,
        };
        let rows = vec![row];
        assert!(resolve(&rows, &ctx("other", None, None)).is_none());
    }
}
