//! Action registry, executor and page automation primitives.
//!
//! - `registry`: typed [`Action`]s erased into a name-indexed [`ActionExecutor`]
//! - `context`: the per-command [`ActionContext`] (restoration flag, page, outbox)
//! - `page`: the DOM port handlers act on, plus a headless [`InMemoryPage`]
//! - `primitives`: click, fill input, navigate and page status handlers

pub mod context;
pub mod errors;
pub mod page;
mod primitives;
pub mod registry;

pub use context::*;
pub use errors::*;
pub use page::*;
pub use primitives::*;
pub use registry::*;
