//! Parser orchestrator.
//!
//! One [`Engine::parse`] call walks a fixed sequence of stages:
//!
//! ```text
//! Uninitialized → PreParsing → PreCommandEval → BlockScanning
//!               → Substituting → PostCommandEval → Done
//! ```
//!
//! A pre-parse handler that sets the text to [`BREAK`](crate::middleware::BREAK)
//! jumps straight to `Done` with an empty result.  Only store failures leave
//! the engine as errors; every other failure is logged and substituted.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::block::VariableBlock;
use crate::error::EngineError;
use crate::eval;
use crate::middleware::{Input, Middleware, Pipeline, PreParse};
use crate::sandbox;
use crate::scan;
use crate::store::{Store, DEFAULT_PREFIX};

// ── Stage ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    PreParsing,
    PreCommandEval,
    BlockScanning,
    Substituting,
    PostCommandEval,
    Done,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Uninitialized => "uninitialized",
            Stage::PreParsing => "pre-parsing",
            Stage::PreCommandEval => "pre-command eval",
            Stage::BlockScanning => "block scanning",
            Stage::Substituting => "substituting",
            Stage::PostCommandEval => "post-command eval",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = %stage, to = %next, "stage");
    *stage = next;
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Per-engine knobs, normally filled from the rc file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Store path prefix (`<prefix>/<name>`).
    pub prefix: String,
    /// Evaluate `^( … )^` blocks.
    pub pre_command: bool,
    /// Evaluate `$( … )$` blocks.
    pub post_command: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
            pre_command: true,
            post_command: true,
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// A reusable parser, optionally bound to one template.
///
/// ```rust
/// use std::sync::Arc;
/// use cmdvar::{Engine, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::new(Some("This is a {stringVAR=test}"), Arc::new(MemoryStore::new()));
/// assert_eq!(engine.parse(None, None).await.unwrap(), "This is a test");
/// # }
/// ```
pub struct Engine {
    template: Option<String>,
    store: Arc<dyn Store>,
    pipeline: Pipeline,
    options: Options,
    ready: OnceCell<String>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("template", &self.template)
            .field("pipeline", &self.pipeline)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(template: Option<&str>, store: Arc<dyn Store>) -> Self {
        Self {
            template: template.map(str::to_owned),
            store,
            pipeline: Pipeline::default(),
            options: Options::default(),
            ready: OnceCell::new(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Replace both middleware chains at once.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Append a handler to the pre-parse chain.
    pub fn pre_parse(&mut self, handler: impl Middleware<PreParse> + 'static) -> &mut Self {
        self.pipeline.pre_parse.push(Arc::new(handler));
        self
    }

    /// Append a handler to the pre-lookup chain.
    pub fn pre_lookup(&mut self, handler: impl Middleware<VariableBlock> + 'static) -> &mut Self {
        self.pipeline.pre_lookup.push(Arc::new(handler));
        self
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Output of the first successful full parse of the constructed
    /// template.  If [`parse`](Self::parse) already produced one, that
    /// output is returned without running the template again; otherwise a
    /// parse is started here.  Later calls return the cached string.
    pub async fn ready(&self) -> Result<&str, EngineError> {
        self.ready
            .get_or_try_init(|| self.parse_constructed(None))
            .await
            .map(String::as_str)
    }

    /// Expand `template`, or the constructed template when `None`.
    pub async fn parse(
        &self,
        template: Option<&str>,
        input: Option<&Input>,
    ) -> Result<String, EngineError> {
        match template {
            Some(template) => self.traced_run(template, input).await,
            None => {
                let out = self.parse_constructed(input).await?;
                // Loses to an earlier parse or to `ready()` already running.
                let _ = self.ready.set(out.clone());
                Ok(out)
            }
        }
    }

    async fn parse_constructed(&self, input: Option<&Input>) -> Result<String, EngineError> {
        let template = self.template.as_deref().ok_or(EngineError::NoTemplate)?;
        self.traced_run(template, input).await
    }

    async fn traced_run(&self, template: &str, input: Option<&Input>) -> Result<String, EngineError> {
        let span = tracing::debug_span!("parse", template);
        self.run(template, input).instrument(span).await
    }

    async fn run(&self, template: &str, input: Option<&Input>) -> Result<String, EngineError> {
        let mut stage = Stage::Uninitialized;

        enter(&mut stage, Stage::PreParsing);
        let mut ctx = PreParse::new(template);
        self.pipeline.pre_parse.dispatch(&mut ctx, input).await;
        if ctx.is_break() {
            enter(&mut stage, Stage::Done);
            return Ok(String::new());
        }
        let mut text = ctx.text;

        if self.options.pre_command {
            enter(&mut stage, Stage::PreCommandEval);
            text = sandbox::run_pre_command(&text);
        }

        enter(&mut stage, Stage::BlockScanning);
        let mut ranges = Vec::new();
        let mut outputs = Vec::new();
        for m in scan::variable_blocks(&text) {
            let Some(mut block) = VariableBlock::parse(m.inner) else {
                continue;
            };
            self.pipeline.pre_lookup.dispatch(&mut block, input).await;
            eval::resolve(&mut block, self.store.as_ref(), &self.options.prefix)
                .await
                .map_err(|source| EngineError::Store { stage, source })?;
            ranges.push(m.range);
            outputs.push(block.output.map(|v| v.to_string()).unwrap_or_default());
        }

        enter(&mut stage, Stage::Substituting);
        text = scan::splice(&text, &ranges, &outputs);

        if self.options.post_command {
            enter(&mut stage, Stage::PostCommandEval);
            text = sandbox::run_post_command(&text);
        }

        enter(&mut stage, Stage::Done);
        Ok(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
