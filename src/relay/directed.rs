//! Directed relay: every sender talks to the owner, and the owner answers
//! through the reply button on a forward.

use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::relay::commands::{AdminCommand, CallbackAction, forward_keyboard};
use crate::relay::notices;
use crate::relay::router::{RelayRouter, RelayState, label};
use crate::relay::types::{
    ChatId, EventPayload, InboundEvent, MessageContent, MessageHandle, OutboundMessage,
    ParseMode, Sender,
};

impl RelayRouter {
    pub(crate) async fn process_directed(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
    ) -> Result<(), RelayError> {
        let from_owner = event.sender.id == self.owner;
        match &event.payload {
            EventPayload::Command { name, args, .. } => {
                if name == "start" {
                    if !from_owner {
                        self.ensure_not_blocked(state, event.sender.id)?;
                    }
                    let text = if from_owner {
                        notices::help(false)
                    } else {
                        notices::SENDER_WELCOME.to_string()
                    };
                    self.notify(state, event.chat_id, text).await;
                    return Ok(());
                }
                match AdminCommand::parse(name, args) {
                    Some(command) => self.run_admin(state, event, command).await,
                    None => {
                        debug!(command = %name, "Ignoring unknown command");
                        Ok(())
                    }
                }
            }
            EventPayload::Message {
                content,
                message_id,
            } => {
                if from_owner {
                    self.owner_message(state, event.chat_id, content).await;
                    Ok(())
                } else {
                    self.forward(state, event, content, *message_id).await
                }
            }
            EventPayload::Callback {
                query_id,
                data,
                message_id,
            } => {
                self.callback(state, event, query_id, data, *message_id).await
            }
        }
    }

    /// Forward a sender's message to the owner with the reply/block
    /// keyboard, then record the correlation and acknowledge.
    async fn forward(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
        content: &MessageContent,
        original: MessageHandle,
    ) -> Result<(), RelayError> {
        let sender: &Sender = &event.sender;
        self.ensure_not_blocked(state, sender.id)?;
        self.ensure_within_rate(state, sender.id)?;

        let alias = match state.identities.resolve_or_create(sender.id).await {
            Ok(alias) => Some(alias),
            Err(e) => {
                warn!(user_id = %sender.id, error = %e, "Forwarding without alias");
                None
            }
        };
        let identity = notices::identity_line(sender, alias.as_deref());
        let owner_chat = ChatId::from(self.owner);

        let heading = format!("{identity}\n\n");
        let escaped = content.clone().map_text(notices::escape_html);
        let body = if escaped.caption_fits(notices::visible_len(&heading), notices::visible_len) {
            escaped.with_prefix(&heading)
        } else {
            // No room in the caption: the identity goes out as its own message.
            let heading = OutboundMessage::text(identity).with_parse_mode(ParseMode::Html);
            if let Err(e) = self.deliver(state, owner_chat, heading).await {
                warn!(user_id = %sender.id, error = %e, "Identity line not delivered");
            }
            escaped
        };

        let message = OutboundMessage::new(body)
            .with_parse_mode(ParseMode::Html)
            .with_markup(forward_keyboard(sender.id, original));
        let handle = self.deliver(state, owner_chat, message).await?;

        state.correlations.record(handle, sender.id, original);
        state.stats.relayed += 1;
        info!(
            user_id = %sender.id,
            kind = %content.kind(),
            handle = %handle,
            "Forwarded to owner"
        );

        self.notify(state, event.chat_id, notices::FORWARD_ACK).await;
        Ok(())
    }

    /// An owner message: relayed only when a reply is pending. The pending
    /// state is cleared before delivery so a failure never leaves it armed.
    async fn owner_message(
        &self,
        state: &mut RelayState,
        chat: ChatId,
        content: &MessageContent,
    ) {
        let Some(pending) = state.owner_session.take_pending_reply() else {
            debug!("Owner message with no pending reply");
            self.notify(state, chat, notices::NOT_AWAITING_REPLY).await;
            return;
        };
        let target = pending.target;

        if state.access.is_blocked(target) {
            info!(user_id = %target, "Reply target is blocked");
            self.notify(state, chat, notices::reply_target_blocked(target)).await;
            return;
        }

        let target_chat = ChatId::from(target);
        let marker_len = notices::OWNER_REPLY_PREFIX.chars().count();
        let body = if content.caption_fits(marker_len, |s: &str| s.chars().count()) {
            content.clone().with_prefix(notices::OWNER_REPLY_PREFIX)
        } else {
            let marker = OutboundMessage::text(notices::OWNER_REPLY_PREFIX.trim_end())
                .reply_to(pending.original);
            if let Err(e) = self.deliver(state, target_chat, marker).await {
                warn!(user_id = %target, error = %e, "Reply marker not delivered");
            }
            content.clone()
        };

        let message = OutboundMessage::new(body).reply_to(pending.original);
        match self.deliver(state, target_chat, message).await {
            Ok(_) => {
                state.stats.replies += 1;
                info!(user_id = %target, kind = %content.kind(), "Owner reply delivered");
                self.notify(state, chat, notices::REPLY_SENT).await;
            }
            Err(e) => {
                warn!(user_id = %target, error = %e, "Owner reply failed");
                self.notify(state, chat, notices::reply_failed(&e.to_string())).await;
            }
        }
    }

    async fn callback(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
        query_id: &str,
        data: &str,
        message_id: Option<MessageHandle>,
    ) -> Result<(), RelayError> {
        let action =
            CallbackAction::parse(data).ok_or_else(|| RelayError::MalformedCallback(data.into()))?;

        if event.sender.id != self.owner {
            let command = match action {
                CallbackAction::Reply { .. } => "reply",
                CallbackAction::Block { .. } => "block",
            };
            return Err(RelayError::UnauthorizedCommand {
                user: event.sender.id,
                command: command.to_string(),
            });
        }

        match action {
            CallbackAction::Reply { sender, original } => {
                // The stored correlation wins; the button data covers
                // forwards that have been evicted.
                let (target, original) = match message_id
                    .and_then(|handle| state.correlations.resolve(handle))
                {
                    Some(c) => (c.source_user, c.original),
                    None => (sender, original),
                };
                state.owner_session.begin_reply(target, Some(original));
                info!(user_id = %target, "Owner started a reply");

                self.answer(query_id, None).await;
                let prompt = notices::reply_prompt(&label(state, target));
                self.notify(state, event.chat_id, prompt).await;
            }
            CallbackAction::Block { sender } => {
                let newly = state.access.block(sender).await?;
                info!(user_id = %sender, newly, "Owner blocked sender from forward");

                if let Some(handle) = message_id {
                    self.clear_markup(event.chat_id, handle).await;
                }
                let confirmation = notices::blocked(&label(state, sender), newly);
                self.answer(query_id, Some(&confirmation)).await;
                self.notify(state, event.chat_id, confirmation).await;
            }
        }
        Ok(())
    }
}
