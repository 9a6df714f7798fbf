//! One engine per distinct template.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::{Engine, Options};
use crate::error::EngineError;
use crate::middleware::{Input, Pipeline};
use crate::store::Store;

/// Hands out shared [`Engine`]s keyed by template text.
///
/// Every engine built here shares the cache's store, options and middleware
/// pipeline, so handlers registered before the first lookup apply to all of
/// them.  Engines are never evicted; use [`uncached`](Self::uncached) for
/// text that is not a fixed command template.
pub struct EngineCache {
    store: Arc<dyn Store>,
    pipeline: Pipeline,
    options: Options,
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl std::fmt::Debug for EngineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCache")
            .field("pipeline", &self.pipeline)
            .field("options", &self.options)
            .field("engines", &self.len())
            .finish_non_exhaustive()
    }
}

impl EngineCache {
    pub fn new(store: Arc<dyn Store>, pipeline: Pipeline, options: Options) -> Self {
        Self {
            store,
            pipeline,
            options,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// The engine for `template`, built on first use.
    pub fn get(&self, template: &str) -> Arc<Engine> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        engines
            .entry(template.to_owned())
            .or_insert_with(|| {
                tracing::debug!(template, "caching engine");
                Arc::new(
                    Engine::new(Some(template), self.store.clone())
                        .with_options(self.options.clone())
                        .with_pipeline(self.pipeline.clone()),
                )
            })
            .clone()
    }

    /// An engine with no template of its own, wired like the cached ones.
    /// For one-off text such as stdin lines, which would otherwise fill the
    /// cache.
    pub fn uncached(&self) -> Engine {
        Engine::new(None, self.store.clone())
            .with_options(self.options.clone())
            .with_pipeline(self.pipeline.clone())
    }

    /// Shorthand for `get(template).parse(None, input)`.
    pub async fn parse(&self, template: &str, input: Option<&Input>) -> Result<String, EngineError> {
        self.get(template).parse(None, input).await
    }

    pub fn len(&self) -> usize {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
