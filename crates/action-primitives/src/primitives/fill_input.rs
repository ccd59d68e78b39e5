//! Fill-input primitive - write values and verify them

use async_trait::async_trait;
use scavbot_core_types::{done_response, GenericStatusPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ActionContext;
use crate::page::{DomEvent, ElementRef, Page};
use crate::registry::{Action, ActionHandler};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub selector: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInputAction {
    pub inputs: Vec<InputValue>,
}

impl Action for FillInputAction {
    const NAME: &'static str = "fillInput";
    type Response = FillInputResponse;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillInputResponse {
    pub all_inputs_filled_correctly: bool,
    #[serde(default)]
    pub failed_selectors: Vec<String>,
}

pub struct FillInputHandler;

fn fill_element(page: &dyn Page, element: &ElementRef, value: &str) -> Result<bool, String> {
    page.set_value(element, value).map_err(|e| e.to_string())?;
    page.dispatch_event(element, DomEvent::Input)
        .map_err(|e| e.to_string())?;
    page.dispatch_event(element, DomEvent::Change)
        .map_err(|e| e.to_string())?;
    Ok(page.value(element).as_deref() == Some(value))
}

#[async_trait]
impl ActionHandler<FillInputAction> for FillInputHandler {
    async fn execute(
        &self,
        action: FillInputAction,
        ctx: &ActionContext,
    ) -> GenericStatusPayload<FillInputResponse> {
        info!(
            action_id = %ctx.action_id,
            inputs = action.inputs.len(),
            "Executing fill_input primitive"
        );

        let mut failed_selectors = Vec::new();
        for input in &action.inputs {
            let elements = ctx.page.query_selector_all(&input.selector);
            if elements.is_empty() {
                warn!(action_id = %ctx.action_id, selector = %input.selector, "input not found");
                failed_selectors.push(input.selector.clone());
                continue;
            }

            let mut input_ok = true;
            for element in &elements {
                match fill_element(ctx.page.as_ref(), element, &input.value) {
                    Ok(true) => debug!(action_id = %ctx.action_id, %element, "input filled"),
                    Ok(false) => {
                        warn!(
                            action_id = %ctx.action_id,
                            %element,
                            expected = %input.value,
                            "input value mismatch after write"
                        );
                        input_ok = false;
                    }
                    Err(err) => {
                        warn!(action_id = %ctx.action_id, %element, %err, "input fill failed");
                        input_ok = false;
                    }
                }
            }
            if !input_ok {
                failed_selectors.push(input.selector.clone());
            }
        }

        let all_inputs_filled_correctly = failed_selectors.is_empty();
        info!(
            action_id = %ctx.action_id,
            all_inputs_filled_correctly,
            "Fill input completed"
        );
        done_response(FillInputResponse {
            all_inputs_filled_correctly,
            failed_selectors,
        })
    }
}
