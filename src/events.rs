use crate::config::AppConfig;
use crate::modem::types::{ModemStatus, PartialDeliveryReport};
use crate::sms::storage::{SmsState, Storage};
use crate::webhooks::WebhookSender;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::log::debug;

#[cfg(feature = "http-server")]
use crate::http::websocket::WebSocketManager;

#[derive(Eq, PartialEq, Hash, Debug, Clone, Copy, Deserialize)]
pub enum EventKind {
    #[serde(rename = "incoming")]
    IncomingMessage,

    #[serde(rename = "outgoing")]
    OutgoingMessage,

    #[serde(rename = "delivery")]
    DeliveryReport,

    #[serde(rename = "modem_status_update")]
    ModemStatusUpdate,
}
#[cfg_attr(not(feature = "http-server"), allow(dead_code))]
impl EventKind {
    pub const COUNT: usize = 4;

    #[inline]
    pub const fn to_bit(self) -> u8 {
        match self {
            EventKind::IncomingMessage => 1 << 0,
            EventKind::OutgoingMessage => 1 << 1,
            EventKind::DeliveryReport => 1 << 2,
            EventKind::ModemStatusUpdate => 1 << 3,
        }
    }

    #[inline]
    pub const fn all_bits() -> u8 {
        (1 << 0) | (1 << 1) | (1 << 2) | (1 << 3)
    }

    #[inline]
    pub fn events_to_mask(events: &[EventKind]) -> u8 {
        events.iter().fold(0, |acc, event| acc | event.to_bit())
    }
}
impl TryFrom<&str> for EventKind {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "incoming" => Ok(EventKind::IncomingMessage),
            "outgoing" => Ok(EventKind::OutgoingMessage),
            "delivery" => Ok(EventKind::DeliveryReport),
            "modem_status_update" => Ok(EventKind::ModemStatusUpdate),
            _ => Err(anyhow!("Unknown event type {}", value)),
        }
    }
}

/// A serializable snapshot of an [`crate::sms::entity::Sms`] at the moment
/// an event fires, since the live object holds an async mutex and isn't
/// itself `Serialize`.
#[derive(Debug, Clone, Serialize)]
pub struct SmsSnapshot {
    pub path: String,
    pub number: String,
    pub text: Option<String>,
    pub is_multipart: bool,
    pub state: SmsState,
    pub storage: Storage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    #[serde(rename = "incoming")]
    IncomingMessage(SmsSnapshot),

    #[serde(rename = "outgoing")]
    OutgoingMessage(SmsSnapshot),

    #[serde(rename = "delivery")]
    DeliveryReport {
        path: String,
        report: PartialDeliveryReport,
    },

    #[serde(rename = "modem_status_update")]
    ModemStatusUpdate {
        previous: ModemStatus,
        current: ModemStatus,
    },
}
impl Event {
    #[inline]
    pub fn to_event_kind(&self) -> EventKind {
        EventKind::from(self)
    }
}
impl From<&Event> for EventKind {
    #[inline]
    fn from(event: &Event) -> Self {
        match event {
            Event::IncomingMessage(_) => EventKind::IncomingMessage,
            Event::OutgoingMessage(_) => EventKind::OutgoingMessage,
            Event::DeliveryReport { .. } => EventKind::DeliveryReport,
            Event::ModemStatusUpdate { .. } => EventKind::ModemStatusUpdate,
        }
    }
}

#[derive(Clone)]
pub struct EventBroadcaster {
    pub webhooks: Option<WebhookSender>,

    #[cfg(feature = "http-server")]
    pub websocket: Option<WebSocketManager>,
}
impl EventBroadcaster {
    pub fn new(config: &AppConfig) -> (Option<Self>, Option<JoinHandle<()>>) {
        let (webhook_sender, webhook_handle) = config
            .webhooks
            .clone()
            .map(WebhookSender::new)
            .map_or((None, None), |(sender, handle)| {
                (Some(sender), Some(handle))
            });

        #[cfg(feature = "http-server")]
        let websocket = config.http.websocket_enabled.then(WebSocketManager::new);

        #[cfg(feature = "http-server")]
        let is_enabled = webhook_sender.is_some() || websocket.is_some();

        #[cfg(not(feature = "http-server"))]
        let is_enabled = webhook_sender.is_some();

        (
            if is_enabled {
                Some(EventBroadcaster {
                    webhooks: webhook_sender,

                    #[cfg(feature = "http-server")]
                    websocket,
                })
            } else {
                None
            },
            webhook_handle,
        )
    }

    #[inline]
    pub async fn broadcast(&self, event: Event) {
        debug!("Broadcasting event: {event:?}");
        if let Some(webhooks) = &self.webhooks {
            webhooks.send(event.clone());
        }

        #[cfg(feature = "http-server")]
        if let Some(websocket) = &self.websocket {
            websocket.broadcast(event);
        }
    }
}
