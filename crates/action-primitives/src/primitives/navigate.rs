//! Navigate primitive - resumable across the reload it triggers

use async_trait::async_trait;
use scavbot_core_types::{done_response, error_response, in_progress_response, GenericStatusPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ActionContext;
use crate::registry::{Action, ActionHandler};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateToPageAction {
    pub url: String,
    /// Accept the current document when the tab already shows `url`.
    #[serde(default)]
    pub reload: bool,
}

impl Action for NavigateToPageAction {
    const NAME: &'static str = "navigateToPage";
    type Response = NavigateResponse;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResponse {
    pub url: String,
    /// True when the page was loaded on behalf of this action.
    pub navigated: bool,
}

pub struct NavigateHandler;

/// Compare URLs ignoring the fragment and a trailing slash.
pub fn urls_match(current: &str, target: &str) -> bool {
    fn normalize(url: &str) -> &str {
        let url = url.split('#').next().unwrap_or(url);
        url.strip_suffix('/').unwrap_or(url)
    }
    normalize(current) == normalize(target)
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }
    if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("file://") {
        return Err(format!("Invalid URL scheme: {url}"));
    }
    Ok(())
}

/// Outcomes:
/// - at target and restored: the navigation this action started has landed, `done`
/// - at target, fresh, `reload` set: the current document is accepted, `done`
/// - otherwise: assign the location and report `in-progress`; the next
///   content-script instance finishes the action.
#[async_trait]
impl ActionHandler<NavigateToPageAction> for NavigateHandler {
    async fn execute(
        &self,
        action: NavigateToPageAction,
        ctx: &ActionContext,
    ) -> GenericStatusPayload<NavigateResponse> {
        info!(
            action_id = %ctx.action_id,
            url = %action.url,
            reload = action.reload,
            restored = ctx.is_current_action_restored,
            "Executing navigate primitive"
        );

        if let Err(reason) = validate_url(&action.url) {
            warn!(action_id = %ctx.action_id, %reason, "navigation rejected");
            return error_response(reason);
        }

        let current = ctx.page.current_url();
        let at_target = urls_match(&current, &action.url);

        if at_target && ctx.is_current_action_restored {
            info!(action_id = %ctx.action_id, url = %current, "Navigation resumed at target");
            return done_response(NavigateResponse {
                url: current,
                navigated: true,
            });
        }

        if at_target && action.reload {
            debug!(action_id = %ctx.action_id, "already at target; accepting current document");
            return done_response(NavigateResponse {
                url: current,
                navigated: false,
            });
        }

        if ctx.is_current_action_restored {
            warn!(
                action_id = %ctx.action_id,
                landed = %current,
                target = %action.url,
                "resumed away from target; navigating again"
            );
        }

        match ctx.page.navigate(&action.url) {
            Ok(()) => in_progress_response(),
            Err(err) => {
                warn!(action_id = %ctx.action_id, %err, "navigation failed to start");
                error_response(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::InMemoryPage;
    use crate::primitives::test_support::context_for;
    use scavbot_core_types::Status;
    use std::sync::Arc;

    const PLACE: &str = "https://pl201.plemiona.pl/game.php?village=1&screen=place";
    const OVERVIEW: &str = "https://pl201.plemiona.pl/game.php?village=1&screen=overview";

    fn navigate(url: &str, reload: bool) -> NavigateToPageAction {
        NavigateToPageAction {
            url: url.into(),
            reload,
        }
    }

    #[test]
    fn url_matching_ignores_fragment_and_trailing_slash() {
        assert!(urls_match("https://a.test/x/", "https://a.test/x#top"));
        assert!(!urls_match("https://a.test/x", "https://a.test/y"));
    }

    #[tokio::test]
    async fn fresh_navigation_starts_and_reports_in_progress() {
        let page = Arc::new(InMemoryPage::new(OVERVIEW));
        let ctx = context_for(page.clone());

        let payload = NavigateHandler.execute(navigate(PLACE, false), &ctx).await;

        assert_eq!(payload.status, Status::InProgress);
        assert_eq!(page.pending_navigation().as_deref(), Some(PLACE));
    }

    #[tokio::test]
    async fn restored_action_at_target_is_done() {
        let page = Arc::new(InMemoryPage::new(PLACE));
        let ctx = context_for(page.clone()).restored(true);

        let payload = NavigateHandler.execute(navigate(PLACE, true), &ctx).await;

        assert_eq!(payload.status, Status::Done);
        assert!(payload.details.unwrap().navigated);
        assert!(page.pending_navigation().is_none());
    }

    #[tokio::test]
    async fn fresh_action_at_target_with_reload_is_done_without_loading() {
        let page = Arc::new(InMemoryPage::new(PLACE));
        let ctx = context_for(page.clone());

        let payload = NavigateHandler.execute(navigate(PLACE, true), &ctx).await;

        assert_eq!(payload.status, Status::Done);
        assert!(!payload.details.unwrap().navigated);
        assert!(page.pending_navigation().is_none());
    }

    #[tokio::test]
    async fn fresh_action_at_target_without_reload_assigns_location() {
        let page = Arc::new(InMemoryPage::new(PLACE));
        let ctx = context_for(page.clone());

        let payload = NavigateHandler.execute(navigate(PLACE, false), &ctx).await;

        assert_eq!(payload.status, Status::InProgress);
        assert_eq!(page.pending_navigation().as_deref(), Some(PLACE));
    }

    #[tokio::test]
    async fn invalid_scheme_is_an_error_status() {
        let page = Arc::new(InMemoryPage::new(PLACE));
        let ctx = context_for(page);

        let payload = NavigateHandler.execute(navigate("game.php", false), &ctx).await;
        assert_eq!(payload.status, Status::Error);
    }
}
