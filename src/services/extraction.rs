use serde::Deserialize;
use serde_json::Value;

use crate::domain::{parse_rows, BusinessSummary, ResultRow};

use super::{scripts, Browser, BrowserError, Soften};

#[derive(Deserialize)]
struct ModelReply {
    ok: bool,
    #[serde(default)]
    data: Vec<Value>,
    error: Option<String>,
}

fn parse_model_reply(raw: Value) -> Vec<BusinessSummary> {
    // The script stringifies its reply; older drivers hand back the object.
    let reply = match raw {
        Value::String(text) => serde_json::from_str::<ModelReply>(&text),
        other => serde_json::from_value::<ModelReply>(other),
    };

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            log::debug!("Unreadable model reply: {}", e);
            return vec![];
        }
    };

    if !reply.ok {
        log::debug!(
            "Model channel unavailable: {}",
            reply.error.unwrap_or_default()
        );
        return vec![];
    }

    reply
        .data
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<BusinessSummary>(entry) {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::warn!("Skipping malformed businessList entry: {}", e);
                None
            }
        })
        .collect()
}

/// Entities from the SPA's client-side model. Empty is a normal answer.
pub async fn extract_business_list(
    browser: &dyn Browser,
) -> Result<Vec<BusinessSummary>, BrowserError> {
    let raw = browser
        .execute_async(scripts::MODEL_BUSINESS_LIST, vec![])
        .await
        .soft()?;
    Ok(raw.map(parse_model_reply).unwrap_or_default())
}

/// Rows from the rendered grid.
pub async fn extract_grid_rows(browser: &dyn Browser) -> Result<Vec<ResultRow>, BrowserError> {
    let html = browser.page_source().await.soft()?.unwrap_or_default();
    Ok(parse_rows(&html))
}
