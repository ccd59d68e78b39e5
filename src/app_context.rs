//! Composition root: builds every service once and owns their lifetime.

use std::sync::Arc;
use std::time::Duration;

use action_primitives::{register_page_actions, ActionExecutor, InMemoryPage};
use extensions_bridge::{LoopbackTransport, Messenger, SimulatedTab, Transport};
use parking_lot::Mutex;
use scavbot_core_types::{FullDomain, Message};
use scavbot_event_bus::InMemoryBus;
use scavbot_scheduler::{KvSnapshotStore, Scheduler, SystemClock, TaskHandlerRegistry};
use scavbot_state_center::{ActionStateStore, InMemoryKvStore, JsonFileKvStore, KeyValueStore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::inbound::InboundRouter;
use crate::tasks::register_default_tasks;

const STORE_FILE: &str = "scavbot.json";
const INBOUND_CAPACITY: usize = 256;
const PAGE_LOAD_DELAY: Duration = Duration::from_millis(200);

/// File-backed store under `storage_dir`, or an in-memory one.
pub fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>, AppError> {
    match &config.storage_dir {
        Some(dir) => {
            let store: Arc<dyn KeyValueStore> = JsonFileKvStore::open(dir.join(STORE_FILE))?;
            Ok(store)
        }
        None => Ok(InMemoryKvStore::new()),
    }
}

/// Scheduler over `store`'s snapshot, restored and ready to start.
pub fn open_scheduler(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    handlers: Arc<TaskHandlerRegistry>,
) -> Scheduler {
    let scheduler = Scheduler::with_clock(
        handlers,
        Arc::new(KvSnapshotStore::new(store)),
        Arc::new(SystemClock),
        config.tick_interval(),
    );
    scheduler.restore_from_storage();
    scheduler
}

pub struct AppContext {
    config: Arc<Config>,
    full_domain: FullDomain,
    store: Arc<dyn KeyValueStore>,
    executor: Arc<ActionExecutor>,
    transport: Arc<LoopbackTransport>,
    messenger: Arc<Messenger>,
    tab: Arc<SimulatedTab>,
    scheduler: Scheduler,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    pub fn build(config: Config) -> Result<Arc<Self>, AppError> {
        config.validate()?;
        let full_domain = FullDomain::new(config.full_domain.clone());
        let store = open_store(&config)?;

        let executor = Arc::new(ActionExecutor::new());
        register_page_actions(&executor);

        let bus = InMemoryBus::<Message>::new(INBOUND_CAPACITY);
        let transport = LoopbackTransport::new(bus);
        let messenger = Arc::new(
            Messenger::new(full_domain.clone(), transport.clone())
                .with_command_timeout(config.command_timeout()),
        );
        let tab = Arc::new(SimulatedTab::new(
            full_domain.clone(),
            Arc::new(InMemoryPage::new(config.start_url.clone())),
            executor.clone(),
            ActionStateStore::new(store.clone()),
            transport.clone(),
        ));

        let handlers = Arc::new(TaskHandlerRegistry::new());
        register_default_tasks(&handlers, messenger.clone());
        let scheduler = open_scheduler(&config, store.clone(), handlers.clone());

        info!(
            full_domain = %full_domain,
            actions = ?executor.registered_actions(),
            task_kinds = ?handlers.kinds(),
            persistent = config.storage_dir.is_some(),
            "Application context built"
        );
        Ok(Arc::new(Self {
            config: Arc::new(config),
            full_domain,
            store,
            executor,
            transport,
            messenger,
            tab,
            scheduler,
            background: Mutex::new(Vec::new()),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    pub fn transport(&self) -> &Arc<LoopbackTransport> {
        &self.transport
    }

    pub fn tab(&self) -> &Arc<SimulatedTab> {
        &self.tab
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Wire the inbound router, load the content script, wait for it to
    /// announce itself, then start the run loop.
    pub async fn start(&self) {
        let router = InboundRouter::new(
            self.full_domain.clone(),
            self.scheduler.clone(),
            self.store.clone(),
        );
        let mut background = Vec::new();
        background.push(router.spawn(self.transport.subscribe()));

        let (ready, _) = tokio::join!(
            self.messenger.wait_for_ready(self.config.ready_timeout()),
            self.tab.load(),
        );
        match ready {
            Ok(ready) => info!(url = %ready.url, "Content script ready"),
            Err(err) => warn!(%err, "content script did not announce itself"),
        }
        background.push(self.tab.spawn_autoload(PAGE_LOAD_DELAY));
        self.background.lock().extend(background);

        self.scheduler.start();
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
        self.messenger.dispose();
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        info!(full_domain = %self.full_domain, "Application context shut down");
    }
}
