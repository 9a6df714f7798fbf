//! Middleware chains.
//!
//! Two independent chains let collaborators bend a parse without touching
//! the engine:
//!
//! | Chain        | Context             | Runs                                   |
//! |--------------|---------------------|----------------------------------------|
//! | pre-parse    | [`PreParse`]        | once, on the raw template              |
//! | pre-lookup   | [`VariableBlock`]   | once per block, before the store read  |
//!
//! Handlers run in registration order.  Each returns [`Flow::Continue`] to
//! pass control on or [`Flow::Stop`] to end that dispatch; a handler that
//! fails is logged and skipped.  Setting the pre-parse text to [`BREAK`]
//! makes the whole parse return an empty string.
//!
//! [`VariableBlock`]: crate::block::VariableBlock

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::block::VariableBlock;
use crate::error::MiddlewareError;

pub mod builtin;

pub use builtin::{Namespace, RejectIf, Replace};

/// Side-channel input handed to every handler, typically the inbound chat
/// message as JSON.
pub type Input = serde_json::Value;

/// Pre-parse text that aborts the parse with an empty result.
pub const BREAK: &str = "BREAK";

// ── Contexts ──────────────────────────────────────────────────────────────────

/// Context of the pre-parse chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreParse {
    pub text: String,
}

impl PreParse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Abort the parse; the engine returns `""`.
    pub fn set_break(&mut self) {
        self.text = BREAK.to_owned();
    }

    pub fn is_break(&self) -> bool {
        self.text == BREAK
    }
}

/// What a handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// One link of a chain over context `C`.
#[async_trait]
pub trait Middleware<C: Send>: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, ctx: &mut C, input: Option<&Input>) -> Result<Flow, MiddlewareError>;
}

/// Handler built from a plain closure by [`from_fn`].
pub struct FnMiddleware<C, F> {
    name: String,
    f: F,
    _ctx: PhantomData<fn(&mut C)>,
}

/// Wrap a synchronous closure as a handler.
///
/// ```rust
/// use cmdvar::middleware::{from_fn, Flow, PreParse};
///
/// let shout = from_fn("shout", |ctx: &mut PreParse, _input| {
///     ctx.text = ctx.text.to_uppercase();
///     Ok(Flow::Continue)
/// });
/// # let _ = shout;
/// ```
pub fn from_fn<C, F>(name: impl Into<String>, f: F) -> FnMiddleware<C, F>
where
    C: Send,
    F: Fn(&mut C, Option<&Input>) -> Result<Flow, MiddlewareError> + Send + Sync,
{
    FnMiddleware {
        name: name.into(),
        f,
        _ctx: PhantomData,
    }
}

#[async_trait]
impl<C, F> Middleware<C> for FnMiddleware<C, F>
where
    C: Send,
    F: Fn(&mut C, Option<&Input>) -> Result<Flow, MiddlewareError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &mut C, input: Option<&Input>) -> Result<Flow, MiddlewareError> {
        (self.f)(ctx, input)
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Ordered, append-only list of handlers.
pub struct Chain<C> {
    handlers: Vec<Arc<dyn Middleware<C>>>,
}

impl<C> Default for Chain<C> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<C> Clone for Chain<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<C: Send> fmt::Debug for Chain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

/// Outcome of one [`Chain::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Handlers invoked, including any that failed.
    pub ran: usize,
    /// A handler returned [`Flow::Stop`].
    pub stopped: bool,
}

impl<C: Send> Chain<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn Middleware<C>>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handlers in order until one stops the chain.
    pub async fn dispatch(&self, ctx: &mut C, input: Option<&Input>) -> Dispatch {
        let mut idx = 0;
        while let Some(handler) = self.handlers.get(idx) {
            idx += 1;
            match handler.handle(ctx, input).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    tracing::debug!(handler = handler.name(), "middleware stopped the chain");
                    return Dispatch {
                        ran: idx,
                        stopped: true,
                    };
                }
                Err(e) => tracing::warn!(error = %e, "middleware failed; continuing"),
            }
        }
        Dispatch {
            ran: idx,
            stopped: false,
        }
    }
}

/// Both chains, shared by every engine built from the same
/// [`EngineCache`](crate::cache::EngineCache).
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub pre_parse: Chain<PreParse>,
    pub pre_lookup: Chain<VariableBlock>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
