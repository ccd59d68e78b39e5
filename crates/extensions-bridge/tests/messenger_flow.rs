use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    register_page_actions, ActionExecutor, ClickAction, ElementNode, FillInputAction, InMemoryPage,
    InputValue, NavigateToPageAction, Outbox, ACTION_NOT_SUPPORTED,
};
use async_trait::async_trait;
use extensions_bridge::{BridgeError, CommandEndpoint, LoopbackTransport, Messenger, SimulatedTab};
use scavbot_core_types::{in_progress_response, ActionId, FullDomain, Message, MessageType, Status};
use scavbot_event_bus::InMemoryBus;
use scavbot_state_center::{ActionStateStore, InMemoryKvStore};
use serde_json::json;

const DOMAIN: &str = "pl201.plemiona.pl";
const OVERVIEW: &str = "https://pl201.plemiona.pl/game.php?screen=overview";
const PLACE: &str = "https://pl201.plemiona.pl/game.php?screen=place";

struct Harness {
    messenger: Arc<Messenger>,
    tab: SimulatedTab,
    states: ActionStateStore,
}

async fn harness(elements: Vec<ElementNode>) -> Harness {
    let page = elements
        .into_iter()
        .fold(InMemoryPage::new(OVERVIEW), |page, el| page.with_element(el));
    let transport = LoopbackTransport::new(InMemoryBus::new(64));
    let executor = Arc::new(ActionExecutor::new());
    register_page_actions(&executor);
    let states = ActionStateStore::new(InMemoryKvStore::new());
    let tab = SimulatedTab::new(
        FullDomain::new(DOMAIN),
        Arc::new(page),
        executor,
        states.clone(),
        transport.clone(),
    );
    tab.load().await;
    let messenger = Messenger::new(FullDomain::new(DOMAIN), transport)
        .with_command_timeout(Duration::from_secs(5));
    Harness {
        messenger: Arc::new(messenger),
        tab,
        states,
    }
}

#[tokio::test]
async fn click_round_trip_reports_aggregate() {
    let h = harness(vec![ElementNode::new("#send")]).await;

    let payload = h
        .messenger
        .execute_click_action(ClickAction {
            selectors: vec!["#send".into(), "#missing".into()],
        })
        .await;

    assert_eq!(payload.status, Status::Done);
    let details = payload.details.expect("click details");
    assert!(!details.all_clicks_done);
    assert_eq!(details.failed_selectors, vec!["#missing".to_string()]);
}

#[tokio::test]
async fn fill_input_writes_through_the_bridge() {
    let h = harness(vec![ElementNode::new("input[name=spear]")]).await;

    let payload = h
        .messenger
        .execute_fill_input_action(FillInputAction {
            inputs: vec![InputValue {
                selector: "input[name=spear]".into(),
                value: "120".into(),
            }],
        })
        .await;

    assert!(payload.details.unwrap().all_inputs_filled_correctly);
}

#[tokio::test]
async fn unknown_action_resolves_with_error_status() {
    let h = harness(Vec::new()).await;

    let payload = h.messenger.send_command("scavenge", json!({})).await.unwrap();
    assert_eq!(payload.status, Status::Error);
    assert_eq!(payload.status_message.as_deref(), Some(ACTION_NOT_SUPPORTED));
}

#[tokio::test]
async fn navigation_completes_after_the_page_reloads() {
    let h = harness(Vec::new()).await;
    let messenger = h.messenger.clone();
    let pending = tokio::spawn(async move {
        messenger
            .execute_navigate_action(NavigateToPageAction {
                url: PLACE.into(),
                reload: false,
            })
            .await
    });

    while h.tab.page().pending_navigation().is_none() {
        tokio::task::yield_now().await;
    }
    assert!(h.states.pending_for(&FullDomain::new(DOMAIN)).unwrap().is_some());

    let (ready, settled) = tokio::join!(
        h.messenger.wait_for_ready(Duration::from_secs(1)),
        h.tab.settle_navigation(vec![ElementNode::new("#command-data-form")]),
    );
    let resumed = settled.expect("navigation was pending").expect("action resumed");
    let ready = ready.unwrap();
    assert_eq!(ready.url, PLACE);
    assert_eq!(ready.restored_action.as_ref(), Some(&resumed.action_id));

    let payload = pending.await.unwrap();
    assert_eq!(payload.status, Status::Done);
    let details = payload.details.unwrap();
    assert!(details.navigated);
    assert_eq!(details.url, PLACE);
    assert_eq!(h.tab.loads(), 2);
    assert!(h.states.pending_for(&FullDomain::new(DOMAIN)).unwrap().is_none());
}

struct NeverFinishes;

#[async_trait]
impl CommandEndpoint for NeverFinishes {
    async fn handle(&self, message: Message) -> Message {
        Message::status(message.full_domain, message.action_id, in_progress_response())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_command_times_out_and_typed_wrapper_interrupts() {
    let transport = LoopbackTransport::new(InMemoryBus::new(8));
    transport.attach(Arc::new(NeverFinishes));
    let messenger = Messenger::new(FullDomain::new(DOMAIN), transport)
        .with_command_timeout(Duration::from_secs(5));

    let err = messenger.send_command("click", json!({ "selectors": [] })).await.unwrap_err();
    assert_eq!(err, BridgeError::Timeout(Duration::from_secs(5)));

    let payload = messenger
        .execute_click_action(ClickAction { selectors: vec![] })
        .await;
    assert_eq!(payload.status, Status::Interrupted);
}

#[tokio::test]
async fn dispose_releases_pending_waits() {
    let bus = InMemoryBus::new(8);
    let transport = LoopbackTransport::new(bus.clone());
    let messenger = Arc::new(Messenger::new(FullDomain::new(DOMAIN), transport));

    let waiter = {
        let messenger = messenger.clone();
        tokio::spawn(async move {
            messenger
                .wait_for(MessageType::Event, |_| true, Duration::from_secs(60), None)
                .await
        })
    };
    while bus.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    messenger.dispose();
    assert_eq!(waiter.await.unwrap().unwrap_err(), BridgeError::Disposed);
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(
        messenger.send_command("click", json!({})).await.unwrap_err(),
        BridgeError::Disposed
    );
}

#[tokio::test]
async fn wait_for_ignores_other_worlds_and_actions() {
    let bus = InMemoryBus::new(8);
    let transport = LoopbackTransport::new(bus.clone());
    let messenger = Messenger::new(FullDomain::new(DOMAIN), transport.clone());
    let outbox = transport.outbox();
    let wanted = ActionId::new();

    let posts = async {
        outbox
            .post(Message::event(FullDomain::new("pl202.plemiona.pl"), wanted.clone(), "popup", json!(1)))
            .await
            .unwrap();
        outbox
            .post(Message::event(FullDomain::new(DOMAIN), ActionId::new(), "popup", json!(2)))
            .await
            .unwrap();
        outbox
            .post(Message::event(FullDomain::new(DOMAIN), wanted.clone(), "popup", json!(3)))
            .await
            .unwrap();
    };
    let (got, ()) = tokio::join!(
        messenger.wait_for(MessageType::Event, |_| true, Duration::from_secs(1), Some(&wanted)),
        posts,
    );

    let got = got.unwrap();
    assert_eq!(got.action_id, wanted);
    assert_eq!(got.full_domain, FullDomain::new(DOMAIN));
}
