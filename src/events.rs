//! Toast-style notification events pushed over the WebSocket channel.
//! Fire-and-forget: no acknowledgement, no replay.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::entities::faucet_request::{RequestSource, RequestStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToastEvent {
    FaucetRequested {
        chain: String,
        address: String,
        source: RequestSource,
        cooldown_until: DateTime<Utc>,
    },
    RequestStatusChanged {
        request_id: i64,
        chain: String,
        status: RequestStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ToastEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastEvent> {
        self.sender.subscribe()
    }

    /// Publishing with no listeners is not an error.
    pub fn publish(&self, event: ToastEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        bus.publish(ToastEvent::RequestStatusChanged {
            request_id: 1,
            chain: "ethereum".to_string(),
            status: RequestStatus::Success,
            tx_hash: Some("0xabc".to_string()),
        });
        let event = receiver.recv().await.expect("event delivered");
        let encoded = serde_json::to_value(&event).expect("serializes");
        assert_eq!(encoded["type"], "request_status_changed");
        assert_eq!(encoded["status"], "SUCCESS");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(ToastEvent::FaucetRequested {
            chain: "sui".to_string(),
            address: "0xabc".to_string(),
            source: RequestSource::CommunityPool,
            cooldown_until: Utc::now(),
        });
    }
}
