//! Shared test harness: an in-memory gateway that records every call.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use relay_bot::channels::{EventStream, Gateway};
use relay_bot::config::{RelayConfig, RelayMode};
use relay_bot::error::ChannelError;
use relay_bot::relay::types::{
    ChatId, EventPayload, InboundEvent, MessageContent, MessageHandle, OutboundMessage, Sender,
    UserId,
};
use relay_bot::relay::{RelayRouter, RelayState};

pub const OWNER: i64 = 999;

/// A delivered message and the handle it was assigned.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub chat: ChatId,
    pub message: OutboundMessage,
    pub handle: MessageHandle,
}

impl Delivery {
    pub fn text(&self) -> Option<&str> {
        self.message.content.text_or_caption()
    }
}

#[derive(Default)]
pub struct MockGateway {
    next_handle: AtomicI64,
    deliveries: Mutex<Vec<Delivery>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    cleared: Mutex<Vec<(ChatId, MessageHandle)>>,
    failing: Mutex<HashSet<ChatId>>,
    delays: Mutex<HashMap<ChatId, Duration>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicI64::new(1000),
            ..Default::default()
        })
    }

    /// Make every delivery to `chat` fail.
    pub async fn fail_for(&self, chat: i64) {
        self.failing.lock().await.insert(ChatId(chat));
    }

    /// Make every delivery to `chat` hang for `delay`.
    pub async fn delay_for(&self, chat: i64, delay: Duration) {
        self.delays.lock().await.insert(ChatId(chat), delay);
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    pub async fn to(&self, chat: i64) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .await
            .iter()
            .filter(|d| d.chat == ChatId(chat))
            .cloned()
            .collect()
    }

    /// Texts (or captions) delivered to `chat`, in order.
    pub async fn texts_to(&self, chat: i64) -> Vec<String> {
        self.to(chat)
            .await
            .iter()
            .filter_map(|d| d.text().map(String::from))
            .collect()
    }

    pub async fn last_to(&self, chat: i64) -> Option<Delivery> {
        self.to(chat).await.pop()
    }

    pub async fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().await.clone()
    }

    pub async fn cleared(&self) -> Vec<(ChatId, MessageHandle)> {
        self.cleared.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.deliveries.lock().await.clear();
        self.answers.lock().await.clear();
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn deliver(
        &self,
        chat: ChatId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, ChannelError> {
        let delay = self.delays.lock().await.get(&chat).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().await.contains(&chat) {
            return Err(ChannelError::SendFailed {
                name: "mock".into(),
                reason: format!("chat {chat} unreachable"),
            });
        }
        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.deliveries.lock().await.push(Delivery {
            chat,
            message,
            handle,
        });
        Ok(handle)
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.answers
            .lock()
            .await
            .push((query_id.to_string(), text.map(String::from)));
        Ok(())
    }

    async fn clear_markup(&self, chat: ChatId, message: MessageHandle) -> Result<(), ChannelError> {
        self.cleared.lock().await.push((chat, message));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

pub fn config(mode: RelayMode) -> RelayConfig {
    let mut config = RelayConfig::new(mode, UserId(OWNER));
    config.delivery_timeout = Duration::from_millis(200);
    config
}

pub fn router(config: &RelayConfig, gateway: &Arc<MockGateway>) -> RelayRouter {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    RelayRouter::new(config, gateway, RelayState::in_memory(config))
}

pub fn command(user: i64, name: &str, args: &[&str]) -> InboundEvent {
    InboundEvent::private(
        Sender::new(user).with_first_name(format!("user{user}")),
        EventPayload::Command {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            message_id: MessageHandle(1),
        },
    )
}

pub fn message(user: i64, content: MessageContent, message_id: i64) -> InboundEvent {
    InboundEvent::private(
        Sender::new(user).with_first_name(format!("user{user}")),
        EventPayload::Message {
            content,
            message_id: MessageHandle(message_id),
        },
    )
}

pub fn text(user: i64, body: &str, message_id: i64) -> InboundEvent {
    message(user, MessageContent::text(body), message_id)
}

pub fn callback(user: i64, data: &str, message_id: Option<i64>) -> InboundEvent {
    InboundEvent::private(
        Sender::new(user).with_first_name(format!("user{user}")),
        EventPayload::Callback {
            query_id: format!("q-{user}"),
            data: data.to_string(),
            message_id: message_id.map(MessageHandle),
        },
    )
}

/// Run one event with a time box.
pub async fn handle(router: &RelayRouter, event: InboundEvent) {
    tokio::time::timeout(Duration::from_secs(5), router.handle(event))
        .await
        .expect("event handling timed out");
}
