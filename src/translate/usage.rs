use std::sync::Arc;
use tracing::{error, info};

use super::{Quota, TranslationApi};
use crate::events::{Event, EventSink};

pub const MISSING_KEY_MESSAGE: &str =
    "DeepL API Key is not configured. Maintain it in the configuration.";

/// "DeepL usage: X of Y characters used." plus a note once a limit is hit
pub fn usage_message(quota: &Quota) -> String {
    let mut msg = format!(
        "DeepL usage: {} of {} characters used.",
        quota.used, quota.limit
    );
    if quota.any_limit_reached {
        msg.push_str(" Quota used up.");
    }
    msg
}

/// Quota lookup that never fails: problems are reported and turn into `None`
pub struct UsageGate {
    api: Arc<dyn TranslationApi>,
    events: Arc<dyn EventSink>,
}

impl UsageGate {
    pub fn new(api: Arc<dyn TranslationApi>, events: Arc<dyn EventSink>) -> Self {
        Self { api, events }
    }

    pub async fn check_quota(&self, api_key: &str) -> Option<Quota> {
        if api_key.trim().is_empty() {
            error!("{}", MISSING_KEY_MESSAGE);
            self.events.emit(Event::Status(MISSING_KEY_MESSAGE.to_string()));
            return None;
        }

        match self.api.usage(api_key.trim()).await {
            Ok(quota) => Some(quota),
            Err(e) => {
                error!("DeepL API Error: {}", e);
                self.events.emit(Event::Status("DeepL API Error.".to_string()));
                None
            }
        }
    }

    /// Standalone usage check, reported as a status message
    pub async fn report(&self, api_key: &str) -> Option<Quota> {
        let quota = self.check_quota(api_key).await?;
        let msg = usage_message(&quota);
        info!("{}", msg);
        self.events.emit(Event::Status(msg));
        Some(quota)
    }
}
