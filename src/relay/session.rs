//! Per-session relay state owned by the router.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::relay::types::{MessageHandle, UserId};

/// Where a member stands in the broadcast room.
///
/// Unregistered → AwaitingPassword → Active, or straight to Active when the
/// room has no password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberPhase {
    #[default]
    Unregistered,
    AwaitingPassword,
    Active,
}

impl MemberPhase {
    pub fn can_transition_to(&self, target: MemberPhase) -> bool {
        use MemberPhase::*;
        matches!(
            (self, target),
            (Unregistered, AwaitingPassword) | (Unregistered, Active) | (AwaitingPassword, Active)
        )
    }
}

impl std::fmt::Display for MemberPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unregistered => "unregistered",
            Self::AwaitingPassword => "awaiting_password",
            Self::Active => "active",
        };
        write!(f, "{s}")
    }
}

/// A reply the owner has asked to send. Present means "awaiting reply".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReply {
    pub target: UserId,
    /// The sender's original message, for threading the reply.
    pub original: Option<MessageHandle>,
}

/// The owner's session in directed mode.
#[derive(Debug, Default)]
pub struct OwnerSession {
    pending_reply: Option<PendingReply>,
}

impl OwnerSession {
    pub fn pending_reply(&self) -> Option<PendingReply> {
        self.pending_reply
    }

    /// Arm the next owner message as a reply to `target`. Replaces any
    /// previous pending reply.
    pub fn begin_reply(&mut self, target: UserId, original: Option<MessageHandle>) {
        self.pending_reply = Some(PendingReply { target, original });
    }

    /// Clear and return the pending reply.
    pub fn take_pending_reply(&mut self) -> Option<PendingReply> {
        self.pending_reply.take()
    }
}

/// Member phases for the broadcast room. Users with an alias are always
/// active; this table only tracks the transient phases.
#[derive(Debug, Default)]
pub struct SessionTable {
    phases: HashMap<UserId, MemberPhase>,
}

impl SessionTable {
    /// Current phase, given whether the user already holds an alias.
    pub fn phase(&self, user: UserId, registered: bool) -> MemberPhase {
        if registered {
            return MemberPhase::Active;
        }
        self.phases.get(&user).copied().unwrap_or_default()
    }

    /// Move a user to `target`. Invalid transitions are refused.
    pub fn transition(&mut self, user: UserId, registered: bool, target: MemberPhase) -> bool {
        let current = self.phase(user, registered);
        if !current.can_transition_to(target) {
            return false;
        }
        match target {
            // Active is derived from the alias map; nothing to remember.
            MemberPhase::Active | MemberPhase::Unregistered => {
                self.phases.remove(&user);
            }
            MemberPhase::AwaitingPassword => {
                self.phases.insert(user, target);
            }
        }
        true
    }

    pub fn awaiting_password(&self) -> usize {
        self.phases
            .values()
            .filter(|p| **p == MemberPhase::AwaitingPassword)
            .count()
    }
}
