//! Anonymous broadcast room.

use tracing::{debug, info};

use crate::error::RelayError;
use crate::relay::commands::AdminCommand;
use crate::relay::notices;
use crate::relay::router::{RelayRouter, RelayState};
use crate::relay::session::MemberPhase;
use crate::relay::types::{
    ChatId, EventPayload, InboundEvent, MessageContent, OutboundMessage, Sender, UserId,
};

impl RelayRouter {
    pub(crate) async fn process_broadcast(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
    ) -> Result<(), RelayError> {
        match &event.payload {
            EventPayload::Command { name, args, .. } => match name.as_str() {
                "start" => self.enter_room(state, event).await,
                _ => match AdminCommand::parse(name, args) {
                    Some(command) => self.run_admin(state, event, command).await,
                    None => {
                        debug!(command = %name, "Ignoring unknown command");
                        Ok(())
                    }
                },
            },
            EventPayload::Message { content, .. } => {
                self.room_message(state, event.chat_id, &event.sender, content).await
            }
            EventPayload::Callback { query_id, .. } => {
                // The room attaches no keyboards.
                self.answer(query_id, Some(notices::UNKNOWN_ACTION)).await;
                Ok(())
            }
        }
    }

    /// `/start`: resolve the alias, or hold the user at the password gate.
    async fn enter_room(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
    ) -> Result<(), RelayError> {
        let user = event.sender.id;
        self.ensure_not_blocked(state, user)?;

        let registered = state.identities.is_registered(user);
        if !registered && user != self.owner && state.gate.is_enabled() {
            state
                .sessions
                .transition(user, registered, MemberPhase::AwaitingPassword);
            info!(user_id = %user, "Awaiting room password");
            self.notify(state, event.chat_id, notices::PASSWORD_PROMPT).await;
            return Ok(());
        }

        let alias = self.admit(state, user, registered).await?;
        self.notify(state, event.chat_id, notices::room_welcome(&alias)).await;
        Ok(())
    }

    /// Assign (or fetch) the alias and mark the member active.
    async fn admit(
        &self,
        state: &mut RelayState,
        user: UserId,
        registered: bool,
    ) -> Result<String, RelayError> {
        let alias = state.identities.resolve_or_create(user).await?;
        state.sessions.transition(user, registered, MemberPhase::Active);
        if !registered {
            info!(user_id = %user, alias = %alias, "Member joined the room");
        }
        Ok(alias)
    }

    async fn room_message(
        &self,
        state: &mut RelayState,
        chat: ChatId,
        sender: &Sender,
        content: &MessageContent,
    ) -> Result<(), RelayError> {
        let user = sender.id;
        self.ensure_not_blocked(state, user)?;

        let registered = state.identities.is_registered(user);
        match state.sessions.phase(user, registered) {
            MemberPhase::AwaitingPassword => {
                return self.try_password(state, chat, user, content).await;
            }
            MemberPhase::Unregistered => {
                self.notify(state, chat, notices::START_FIRST).await;
                return Ok(());
            }
            MemberPhase::Active => {}
        }

        let MessageContent::Text { text } = content else {
            self.notify(state, chat, notices::TEXT_ONLY).await;
            return Ok(());
        };

        self.ensure_within_rate(state, user)?;

        let alias = state.identities.resolve_or_create(user).await?;
        self.fan_out(state, user, &format!("{alias}: {text}")).await;
        Ok(())
    }

    async fn try_password(
        &self,
        state: &mut RelayState,
        chat: ChatId,
        user: UserId,
        content: &MessageContent,
    ) -> Result<(), RelayError> {
        let candidate = match content {
            MessageContent::Text { text } => text.as_str(),
            _ => {
                self.notify(state, chat, notices::PASSWORD_PROMPT).await;
                return Ok(());
            }
        };

        if !state.gate.check(candidate) {
            info!(user_id = %user, "Wrong room password");
            self.notify(state, chat, notices::WRONG_PASSWORD).await;
            self.notify(state, chat, notices::PASSWORD_PROMPT).await;
            return Ok(());
        }

        let alias = self.admit(state, user, false).await?;
        self.notify(state, chat, notices::password_accepted(&alias)).await;
        Ok(())
    }

    /// Deliver to every other registered, unblocked member. Individual
    /// failures are counted and skipped.
    async fn fan_out(&self, state: &mut RelayState, from: UserId, text: &str) {
        let recipients: Vec<UserId> = state
            .identities
            .users()
            .map(|(id, _)| id)
            .filter(|id| *id != from && !state.access.is_blocked(*id))
            .collect();

        let mut delivered = 0usize;
        for recipient in &recipients {
            let message = OutboundMessage::text(text);
            if self
                .deliver(state, ChatId::from(*recipient), message)
                .await
                .is_ok()
            {
                delivered += 1;
            }
        }

        state.stats.relayed += 1;
        info!(
            user_id = %from,
            recipients = recipients.len(),
            delivered,
            "Broadcast message"
        );
    }
}
