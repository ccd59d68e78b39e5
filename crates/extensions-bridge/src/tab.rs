//! Headless browser tab: an [`InMemoryPage`] plus the content runtime
//! currently attached to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ActionExecutor, ElementNode, InMemoryPage};
use scavbot_core_types::FullDomain;
use scavbot_state_center::ActionStateStore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::content::{ContentRuntime, ResumedAction};
use crate::transport::LoopbackTransport;

pub struct SimulatedTab {
    full_domain: FullDomain,
    page: Arc<InMemoryPage>,
    executor: Arc<ActionExecutor>,
    states: ActionStateStore,
    transport: Arc<LoopbackTransport>,
    loads: AtomicU64,
}

impl SimulatedTab {
    pub fn new(
        full_domain: FullDomain,
        page: Arc<InMemoryPage>,
        executor: Arc<ActionExecutor>,
        states: ActionStateStore,
        transport: Arc<LoopbackTransport>,
    ) -> Self {
        Self {
            full_domain,
            page,
            executor,
            states,
            transport,
            loads: AtomicU64::new(0),
        }
    }

    pub fn page(&self) -> &Arc<InMemoryPage> {
        &self.page
    }

    /// Number of content-script instances booted so far.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Inject a fresh content script into the current document.
    pub async fn load(&self) -> Option<ResumedAction> {
        let runtime = ContentRuntime::new(
            self.full_domain.clone(),
            self.executor.clone(),
            self.page.clone(),
            self.transport.outbox(),
            self.states.clone(),
        );
        self.transport.attach(runtime.clone());
        self.loads.fetch_add(1, Ordering::Relaxed);
        runtime.boot().await
    }

    /// Complete a pending navigation with `elements` as the new document
    /// and boot the content script for it. `None` when nothing was pending.
    pub async fn settle_navigation(&self, elements: Vec<ElementNode>) -> Option<Option<ResumedAction>> {
        self.page.pending_navigation()?;
        // The old instance dies with its page.
        self.transport.detach();
        let url = self.page.finish_navigation(elements)?;
        info!(full_domain = %self.full_domain, %url, "Page loaded");
        Some(self.load().await)
    }

    /// Finish every navigation the page starts, after `delay`, the way a
    /// browser would load the new document.
    pub fn spawn_autoload(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let tab = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if tab.page.pending_navigation().is_some() {
                    tab.settle_navigation(Vec::new()).await;
                }
            }
        })
    }
}
