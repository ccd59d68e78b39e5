//! Click primitive - dispatch a pointer event sequence on every match

use async_trait::async_trait;
use scavbot_core_types::{done_response, GenericStatusPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ActionContext;
use crate::page::DomEvent;
use crate::registry::{Action, ActionHandler};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAction {
    pub selectors: Vec<String>,
}

impl Action for ClickAction {
    const NAME: &'static str = "click";
    type Response = ClickResponse;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickResponse {
    pub all_clicks_done: bool,
    #[serde(default)]
    pub failed_selectors: Vec<String>,
}

pub struct ClickHandler;

/// Every selector is attempted even after an earlier one failed; the
/// response aggregates the outcome.
#[async_trait]
impl ActionHandler<ClickAction> for ClickHandler {
    async fn execute(
        &self,
        action: ClickAction,
        ctx: &ActionContext,
    ) -> GenericStatusPayload<ClickResponse> {
        info!(
            action_id = %ctx.action_id,
            selectors = action.selectors.len(),
            "Executing click primitive"
        );

        let mut failed_selectors = Vec::new();
        for selector in &action.selectors {
            let elements = ctx.page.query_selector_all(selector);
            if elements.is_empty() {
                warn!(action_id = %ctx.action_id, %selector, "click target not found");
                failed_selectors.push(selector.clone());
                continue;
            }

            let mut selector_ok = true;
            for element in &elements {
                for event in DomEvent::CLICK_SEQUENCE {
                    if let Err(err) = ctx.page.dispatch_event(element, event) {
                        warn!(action_id = %ctx.action_id, %element, %err, "click dispatch failed");
                        selector_ok = false;
                        break;
                    }
                }
                debug!(action_id = %ctx.action_id, %element, "click sequence dispatched");
            }
            if !selector_ok {
                failed_selectors.push(selector.clone());
            }
        }

        let all_clicks_done = failed_selectors.is_empty();
        info!(action_id = %ctx.action_id, all_clicks_done, "Click completed");
        done_response(ClickResponse {
            all_clicks_done,
            failed_selectors,
        })
    }
}
