//! Relay router. Decides, per inbound event, whether to accept it and where
//! to send it.
//!
//! All mutable relay state lives in one [`RelayState`] behind a single
//! async mutex that is held for the whole of one event, so two events never
//! race on alias generation, the block set, or a rate window. Every outbound
//! platform call is bounded by the configured delivery timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::Gateway;
use crate::config::{RelayConfig, RelayMode};
use crate::error::{AccessError, ChannelError, IdentityError, RelayError};
use crate::relay::access::AccessControl;
use crate::relay::commands::AdminCommand;
use crate::relay::correlation::CorrelationStore;
use crate::relay::gate::{RoomGate, RoomSettings};
use crate::relay::identity::IdentityStore;
use crate::relay::notices;
use crate::relay::rate_limit::RateLimiter;
use crate::relay::session::{OwnerSession, PendingReply, SessionTable};
use crate::relay::types::{
    ChatId, EventPayload, InboundEvent, MessageHandle, OutboundMessage, UserId,
};
use crate::store::{SnapshotFile, files};

/// Counters reported by `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Messages accepted and relayed (broadcast or forward).
    pub relayed: u64,
    /// Owner replies delivered.
    pub replies: u64,
    /// Messages refused by the rate limiter.
    pub rate_limited: u64,
    /// Outbound calls that failed or timed out.
    pub delivery_failures: u64,
}

/// Everything the router mutates.
pub struct RelayState {
    pub(crate) identities: IdentityStore,
    pub(crate) access: AccessControl,
    pub(crate) limiter: RateLimiter,
    pub(crate) correlations: CorrelationStore,
    pub(crate) gate: RoomGate,
    pub(crate) sessions: SessionTable,
    pub(crate) owner_session: OwnerSession,
    pub(crate) stats: RelayStats,
}

impl RelayState {
    /// Fresh in-memory state with nothing persisted.
    pub fn in_memory(config: &RelayConfig) -> Self {
        Self {
            identities: IdentityStore::new(config.alias_format.clone()),
            access: AccessControl::new(config.owner),
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            correlations: CorrelationStore::new(config.correlation_capacity),
            gate: RoomGate::new(RoomSettings::default()),
            sessions: SessionTable::default(),
            owner_session: OwnerSession::default(),
            stats: RelayStats::default(),
        }
    }

    /// State reloaded from the snapshot files in `config.data_dir`.
    pub async fn load(config: &RelayConfig) -> Self {
        let dir = &config.data_dir;
        let identities = IdentityStore::load(
            config.alias_format.clone(),
            SnapshotFile::in_dir(dir, files::USERS),
        )
        .await;
        let access =
            AccessControl::load(config.owner, SnapshotFile::in_dir(dir, files::BLOCKED)).await;
        let gate = RoomGate::load(SnapshotFile::in_dir(dir, files::CONFIG)).await;

        info!(
            users = identities.len(),
            blocked = access.list_blocked().len(),
            password = gate.is_enabled(),
            data_dir = %dir.display(),
            "Relay state loaded"
        );

        Self {
            identities,
            access,
            gate,
            ..Self::in_memory(config)
        }
    }
}

/// Routes inbound events according to the configured [`RelayMode`].
pub struct RelayRouter {
    pub(crate) mode: RelayMode,
    pub(crate) owner: UserId,
    pub(crate) delivery_timeout: Duration,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) state: Mutex<RelayState>,
    started_at: DateTime<Utc>,
}

impl RelayRouter {
    pub fn new(config: &RelayConfig, gateway: Arc<dyn Gateway>, state: RelayState) -> Self {
        Self {
            mode: config.mode,
            owner: config.owner,
            delivery_timeout: config.delivery_timeout,
            gateway,
            state: Mutex::new(state),
            started_at: Utc::now(),
        }
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// Handle one inbound event to completion. Failures are reported to the
    /// user and logged; they never propagate.
    pub async fn handle(&self, event: InboundEvent) {
        let mut state = self.state.lock().await;
        let result = match self.mode {
            RelayMode::Broadcast => self.process_broadcast(&mut state, &event).await,
            RelayMode::Directed => self.process_directed(&mut state, &event).await,
        };
        if let Err(e) = result {
            self.report(&mut state, &event, e).await;
        }
    }

    /// The owner's pending reply, if any.
    pub async fn pending_reply(&self) -> Option<PendingReply> {
        self.state.lock().await.owner_session.pending_reply()
    }

    pub async fn alias_of(&self, user: UserId) -> Option<String> {
        self.state
            .lock()
            .await
            .identities
            .alias_of(user)
            .map(str::to_string)
    }

    pub async fn is_blocked(&self, user: UserId) -> bool {
        self.state.lock().await.access.is_blocked(user)
    }

    pub async fn stats(&self) -> RelayStats {
        self.state.lock().await.stats
    }

    /// Periodically drop idle rate-limit windows.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mut state = router.state.lock().await;
                let removed = state.limiter.sweep(Utc::now());
                if removed > 0 {
                    debug!(
                        removed,
                        tracked = state.limiter.tracked_users(),
                        "Swept idle rate windows"
                    );
                }
            }
        })
    }

    // ── Outbound calls ───────────────────────────────────────────────

    /// Deliver with the configured timeout.
    pub(crate) async fn deliver(
        &self,
        state: &mut RelayState,
        chat: ChatId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, ChannelError> {
        let result = match tokio::time::timeout(
            self.delivery_timeout,
            self.gateway.deliver(chat, message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                name: self.gateway.name().to_string(),
                timeout: self.delivery_timeout,
            }),
        };
        if let Err(e) = &result {
            state.stats.delivery_failures += 1;
            debug!(chat = %chat, error = %e, "Delivery failed");
        }
        result
    }

    /// Best-effort plain text notice.
    pub(crate) async fn notify(
        &self,
        state: &mut RelayState,
        chat: ChatId,
        text: impl Into<String>,
    ) {
        if let Err(e) = self.deliver(state, chat, OutboundMessage::text(text)).await {
            warn!(chat = %chat, error = %e, "Failed to send notice");
        }
    }

    /// Best-effort callback acknowledgement.
    pub(crate) async fn answer(&self, query_id: &str, text: Option<&str>) {
        let call = self.gateway.answer_callback(query_id, text);
        match tokio::time::timeout(self.delivery_timeout, call).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to answer callback"),
            Err(_) => warn!("Answering callback timed out"),
        }
    }

    /// Best-effort keyboard removal.
    pub(crate) async fn clear_markup(&self, chat: ChatId, message: MessageHandle) {
        let call = self.gateway.clear_markup(chat, message);
        match tokio::time::timeout(self.delivery_timeout, call).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to clear keyboard"),
            Err(_) => warn!("Clearing keyboard timed out"),
        }
    }

    // ── Shared checks ───────────────────────────────────────────────

    /// Refuse blocked senders. The owner is never subject to blocking.
    pub(crate) fn ensure_not_blocked(
        &self,
        state: &RelayState,
        user: UserId,
    ) -> Result<(), RelayError> {
        if user != self.owner && state.access.is_blocked(user) {
            return Err(RelayError::AccessDenied(user));
        }
        Ok(())
    }

    /// Count a message against the sender's window. The owner is exempt.
    pub(crate) fn ensure_within_rate(
        &self,
        state: &mut RelayState,
        user: UserId,
    ) -> Result<(), RelayError> {
        if user == self.owner {
            return Ok(());
        }
        if !state.limiter.check_and_record(user, Utc::now()) {
            state.stats.rate_limited += 1;
            return Err(RelayError::RateLimited(user));
        }
        Ok(())
    }

    // ── Administrative commands ─────────────────────────────────────

    /// Run an owner command. Non-owners are refused.
    pub(crate) async fn run_admin(
        &self,
        state: &mut RelayState,
        event: &InboundEvent,
        command: AdminCommand,
    ) -> Result<(), RelayError> {
        let sender = event.sender.id;
        if sender != self.owner {
            return Err(RelayError::UnauthorizedCommand {
                user: sender,
                command: command.name().to_string(),
            });
        }
        info!(command = command.name(), "Admin command");

        let reply = match command {
            AdminCommand::Help => notices::help(self.mode == RelayMode::Broadcast),
            AdminCommand::Users => self.render_users(state),
            AdminCommand::BlockList => self.render_blocklist(state),
            AdminCommand::Block(None) => notices::usage("block", "<alias|id>"),
            AdminCommand::Block(Some(arg)) => {
                let target = resolve_target(state, &arg)?;
                let newly = state.access.block(target).await?;
                notices::blocked(&label(state, target), newly)
            }
            AdminCommand::Unblock(None) => notices::usage("unblock", "<alias|id>"),
            AdminCommand::Unblock(Some(arg)) => {
                let target = resolve_target(state, &arg)?;
                let was_blocked = state.access.unblock(target).await?;
                notices::unblocked(&label(state, target), was_blocked)
            }
            AdminCommand::Stats => self.render_stats(state),
            AdminCommand::SetPassword(_) | AdminCommand::DisablePassword
                if self.mode != RelayMode::Broadcast =>
            {
                notices::BROADCAST_ONLY.to_string()
            }
            AdminCommand::SetPassword(None) => notices::usage("setpassword", "<word>"),
            AdminCommand::SetPassword(Some(word)) => {
                state.gate.set_password(&word).await;
                notices::PASSWORD_ENABLED.to_string()
            }
            AdminCommand::DisablePassword => {
                state.gate.disable().await;
                notices::PASSWORD_DISABLED.to_string()
            }
        };

        self.notify(state, event.chat_id, reply).await;
        Ok(())
    }

    fn render_users(&self, state: &RelayState) -> String {
        if state.identities.is_empty() {
            return notices::NO_USERS.to_string();
        }
        let mut out = String::from("Users:\n");
        for (id, alias) in state.identities.users() {
            let status = if state.access.is_blocked(id) {
                "blocked"
            } else {
                "active"
            };
            out.push_str(&format!("{alias} ({status})\n"));
        }
        out
    }

    fn render_blocklist(&self, state: &RelayState) -> String {
        let blocked = state.access.list_blocked();
        if blocked.is_empty() {
            return notices::NO_BLOCKED.to_string();
        }
        let mut out = String::from("Blocked:\n");
        for id in blocked {
            out.push_str(&label(state, *id));
            out.push('\n');
        }
        out
    }

    fn render_stats(&self, state: &RelayState) -> String {
        let uptime = Utc::now() - self.started_at;
        let mut out = format!(
            "Mode: {}\nTotal users: {}\nBlocked: {}\nRelayed: {}\nRate limited: {}\nDelivery failures: {}\nUptime: {}h {}m",
            self.mode,
            state.identities.len(),
            state.access.list_blocked().len(),
            state.stats.relayed,
            state.stats.rate_limited,
            state.stats.delivery_failures,
            uptime.num_hours(),
            uptime.num_minutes() % 60,
        );
        match self.mode {
            RelayMode::Broadcast => {
                out.push_str(&format!(
                    "\nPassword: {}\nAwaiting password: {}",
                    if state.gate.is_enabled() { "on" } else { "off" },
                    state.sessions.awaiting_password(),
                ));
            }
            RelayMode::Directed => {
                out.push_str(&format!(
                    "\nReplies: {}\nTracked forwards: {}",
                    state.stats.replies,
                    state.correlations.len(),
                ));
            }
        }
        out
    }

    // ── Error reporting ─────────────────────────────────────────────

    /// Translate a failed event into a user-visible notice.
    async fn report(&self, state: &mut RelayState, event: &InboundEvent, err: RelayError) {
        let chat = event.chat_id;
        let query_id = match &event.payload {
            EventPayload::Callback { query_id, .. } => Some(query_id.as_str()),
            _ => None,
        };

        match &err {
            RelayError::AccessDenied(user) => {
                debug!(user_id = %user, "Rejected blocked sender");
                match query_id {
                    Some(id) => self.answer(id, Some(notices::BLOCKED)).await,
                    None => self.notify(state, chat, notices::BLOCKED).await,
                }
            }
            RelayError::RateLimited(user) => {
                info!(user_id = %user, "Message dropped by rate limiter");
                self.notify(state, chat, notices::SLOW_DOWN).await;
            }
            RelayError::UnauthorizedCommand { user, command } => match query_id {
                Some(id) => {
                    warn!(user_id = %user, action = %command, "Non-owner pressed owner button");
                    self.answer(id, Some(notices::OWNER_ONLY)).await;
                    self.notify(state, chat, notices::OWNER_ONLY).await;
                }
                None => debug!(user_id = %user, command = %command, "Ignoring owner-only command"),
            },
            RelayError::Delivery(e) => {
                warn!(error = %e, "Relay delivery failed");
                self.notify(state, chat, notices::FORWARD_FAILED).await;
            }
            RelayError::Access(AccessError::SelfBlock(_)) => {
                match query_id {
                    Some(id) => self.answer(id, Some(notices::CANNOT_BLOCK_OWNER)).await,
                    None => self.notify(state, chat, notices::CANNOT_BLOCK_OWNER).await,
                }
            }
            RelayError::Identity(IdentityError::AliasSpaceExhausted { attempts }) => {
                error!(attempts, "Alias namespace exhausted");
                self.notify(state, chat, notices::ALIAS_UNAVAILABLE).await;
            }
            RelayError::UnknownTarget(arg) => {
                self.notify(state, chat, notices::target_not_found(arg)).await;
            }
            RelayError::MalformedCallback(data) => {
                warn!(data = %data, "Malformed callback data");
                if let Some(id) = query_id {
                    self.answer(id, Some(notices::UNKNOWN_ACTION)).await;
                }
            }
        }
    }
}

/// Resolve a command argument to a user: alias first, then a raw id.
fn resolve_target(state: &RelayState, arg: &str) -> Result<UserId, RelayError> {
    if let Some(id) = state.identities.lookup_user_by_alias(arg) {
        return Ok(id);
    }
    arg.trim()
        .parse::<i64>()
        .map(UserId)
        .map_err(|_| RelayError::UnknownTarget(arg.to_string()))
}

/// Human label for a user: alias when known, else the id.
pub(crate) fn label(state: &RelayState, user: UserId) -> String {
    match state.identities.alias_of(user) {
        Some(alias) => format!("{alias} ({user})"),
        None => user.to_string(),
    }
}
