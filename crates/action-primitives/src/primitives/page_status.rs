//! Page status primitive - report where the tab is and what it shows

use async_trait::async_trait;
use scavbot_core_types::{done_response, GenericStatusPayload};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ActionContext;
use crate::primitives::navigate::urls_match;
use crate::registry::{Action, ActionHandler};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStatusAction {
    #[serde(default)]
    pub expected_url: Option<String>,
    /// Selectors whose presence should be reported (captcha, popups, ...).
    #[serde(default)]
    pub probe_selectors: Vec<String>,
}

impl Action for PageStatusAction {
    const NAME: &'static str = "pageStatus";
    type Response = PageStatusResponse;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStatusResponse {
    pub url: String,
    pub title: Option<String>,
    pub url_matches: Option<bool>,
    pub present_selectors: Vec<String>,
}

pub struct PageStatusHandler;

#[async_trait]
impl ActionHandler<PageStatusAction> for PageStatusHandler {
    async fn execute(
        &self,
        action: PageStatusAction,
        ctx: &ActionContext,
    ) -> GenericStatusPayload<PageStatusResponse> {
        let url = ctx.page.current_url();
        let url_matches = action
            .expected_url
            .as_deref()
            .map(|expected| urls_match(&url, expected));
        let present_selectors: Vec<String> = action
            .probe_selectors
            .into_iter()
            .filter(|selector| !ctx.page.query_selector_all(selector).is_empty())
            .collect();

        info!(
            action_id = %ctx.action_id,
            %url,
            ?url_matches,
            present = present_selectors.len(),
            "Page status captured"
        );
        done_response(PageStatusResponse {
            url,
            title: ctx.page.title(),
            url_matches,
            present_selectors,
        })
    }
}
