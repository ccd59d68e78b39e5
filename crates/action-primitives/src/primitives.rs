//! Page automation primitives
//!
//! Four actions executed inside the content context:
//! 1. click - realistic mousedown/mouseup/click sequence per selector
//! 2. fill_input - write values and fire input/change events
//! 3. navigate - move the tab to a URL, resumable across reloads
//! 4. page_status - read URL, title and selector presence

mod click;
mod fill_input;
mod navigate;
mod page_status;

pub use click::*;
pub use fill_input::*;
pub use navigate::*;
pub use page_status::*;

use crate::registry::ActionExecutor;

/// Register every page primitive on `executor`.
pub fn register_page_actions(executor: &ActionExecutor) {
    executor.register::<ClickAction, _>(ClickHandler);
    executor.register::<FillInputAction, _>(FillInputHandler);
    executor.register::<NavigateToPageAction, _>(NavigateHandler);
    executor.register::<PageStatusAction, _>(PageStatusHandler);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use scavbot_core_types::{ActionId, FullDomain};

    use crate::context::{ActionContext, NoopOutbox};
    use crate::page::InMemoryPage;

    pub fn context_for(page: Arc<InMemoryPage>) -> ActionContext {
        ActionContext::new(
            ActionId::new(),
            FullDomain::new("pl201.plemiona.pl"),
            page,
            Arc::new(NoopOutbox),
        )
    }
}
