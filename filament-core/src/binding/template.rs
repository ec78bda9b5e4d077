//! Template sources.
//!
//! Template loading and caching are external concerns; the pipeline only
//! needs something that turns a URL or cache key into node specs,
//! eventually. [`MemoryTemplates`] is the in-process implementation used by
//! embedders without a network layer (and by the tests).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::dom::NodeSpec;
use crate::error::TemplateError;

pub type TemplateFuture = BoxFuture<'static, Result<Vec<NodeSpec>, TemplateError>>;

/// Where a control's template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    Inline(Vec<NodeSpec>),
    Url(String),
    Cached(String),
}

impl TemplateRef {
    pub(crate) fn load(&self, source: &dyn TemplateSource) -> TemplateFuture {
        match self {
            TemplateRef::Inline(nodes) => future::ready(Ok(nodes.clone())).boxed(),
            TemplateRef::Url(url) => source.fetch_template(url),
            TemplateRef::Cached(key) => source.read_cached_template(key),
        }
    }
}

pub trait TemplateSource: Send + Sync {
    fn fetch_template(&self, url: &str) -> TemplateFuture;

    fn read_cached_template(&self, key: &str) -> TemplateFuture;
}

/// Templates held in memory, keyed by URL or cache key alike.
#[derive(Debug, Default)]
pub struct MemoryTemplates {
    templates: DashMap<String, Arc<Vec<NodeSpec>>>,
    failures: DashMap<String, String>,
    latency: Option<Duration>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency` (requires a tokio runtime).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, key: impl Into<String>, nodes: Vec<NodeSpec>) {
        self.templates.insert(key.into(), Arc::new(nodes));
    }

    pub fn insert_json(&self, key: impl Into<String>, json: &str) -> Result<(), serde_json::Error> {
        self.insert(key, NodeSpec::parse_list(json)?);
        Ok(())
    }

    /// Make every lookup of `key` fail with `reason`.
    pub fn fail(&self, key: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(key.into(), reason.into());
    }

    fn lookup(&self, key: &str) -> TemplateFuture {
        let result = match self.failures.get(key) {
            Some(reason) => Err(TemplateError::Fetch {
                key: key.to_string(),
                reason: reason.clone(),
            }),
            None => self
                .templates
                .get(key)
                .map(|nodes| nodes.as_ref().clone())
                .ok_or_else(|| TemplateError::NotFound(key.to_string())),
        };

        match self.latency {
            Some(latency) => async move {
                tokio::time::sleep(latency).await;
                result
            }
            .boxed(),
            None => future::ready(result).boxed(),
        }
    }
}

impl TemplateSource for MemoryTemplates {
    fn fetch_template(&self, url: &str) -> TemplateFuture {
        self.lookup(url)
    }

    fn read_cached_template(&self, key: &str) -> TemplateFuture {
        self.lookup(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookups() {
        let templates = MemoryTemplates::new();
        templates.insert("a.html", vec![NodeSpec::text("a")]);
        templates
            .insert_json("b", r#"{"tag": "b", "children": ["x"]}"#)
            .unwrap();
        templates.fail("broken", "offline");

        assert_eq!(
            TemplateRef::Url("a.html".into()).load(&templates).await,
            Ok(vec![NodeSpec::text("a")])
        );
        assert_eq!(
            TemplateRef::Cached("b".into()).load(&templates).await.unwrap().len(),
            1
        );
        assert_eq!(
            templates.fetch_template("missing").await,
            Err(TemplateError::NotFound("missing".into()))
        );
        assert_eq!(
            templates.read_cached_template("broken").await,
            Err(TemplateError::Fetch {
                key: "broken".into(),
                reason: "offline".into()
            })
        );
        assert_eq!(
            TemplateRef::Inline(vec![NodeSpec::text("i")]).load(&templates).await,
            Ok(vec![NodeSpec::text("i")])
        );
    }

    #[tokio::test]
    async fn latency_delays_but_resolves() {
        let templates = MemoryTemplates::new().with_latency(Duration::from_millis(5));
        templates.insert("slow", vec![NodeSpec::text("s")]);
        assert!(templates.fetch_template("slow").await.is_ok());
    }
}
