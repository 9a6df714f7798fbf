//! `cmdvar` expands chat-command templates.
//!
//! A template is plain text with embedded blocks:
//!
//! | Block | Meaning |
//! |-------|---------|
//! | `{name}` | stored value of `name` |
//! | `{name=value}` | assign, `{name=null}` deletes |
//! | `{name+value}` / `{name-value}` | add / subtract (type-dependent) |
//! | `{name++}` / `{name--}` | step a number |
//! | `{…\|fallback}` | substitute `fallback` if the block fails |
//! | `^( code )^` | expression evaluated before variable blocks |
//! | `$( code )$` | expression evaluated after substitution |
//!
//! Values are strings, numbers, `[ordered,lists]` and `(unique,sets)`; the
//! type is inferred from the literal and enforced against what is stored.
//!
//! ```rust
//! use std::sync::Arc;
//! use cmdvar::{Engine, MemoryStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! Engine::new(Some("{numberVAR=5}"), store.clone()).parse(None, None).await.unwrap();
//! let out = Engine::new(Some("This is a {numberVAR+1}"), store).parse(None, None).await.unwrap();
//! assert_eq!(out, "This is a 6");
//! # }
//! ```

pub mod block;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod middleware;
pub mod sandbox;
pub mod scan;
pub mod store;
pub mod value;

pub use cache::EngineCache;
pub use engine::{Engine, Options, Stage};
pub use error::{EngineError, MiddlewareError, ResolveError, SandboxError, StoreError};
pub use middleware::{Flow, Input, Middleware, PreParse};
pub use store::{JsonFileStore, MemoryStore, Store};
pub use value::{Datatype, Scalar, Value};
