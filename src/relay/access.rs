//! Access control. The persisted block set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::AccessError;
use crate::relay::types::UserId;
use crate::store::SnapshotFile;

/// One entry of `blocked_users.json`. Older snapshots stored ids as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredId {
    Int(i64),
    Legacy(String),
}

/// Block set over user ids. The owner can never be blocked.
pub struct AccessControl {
    owner: UserId,
    blocked: BTreeSet<UserId>,
    snapshot: Option<SnapshotFile<Vec<StoredId>>>,
}

impl AccessControl {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            blocked: BTreeSet::new(),
            snapshot: None,
        }
    }

    /// Load the block set from its snapshot file and keep writing back to it.
    pub async fn load(owner: UserId, snapshot: SnapshotFile<Vec<StoredId>>) -> Self {
        let mut access = Self::new(owner);
        for entry in snapshot.load_or_default().await {
            let id = match entry {
                StoredId::Int(id) => id,
                StoredId::Legacy(raw) => match raw.trim().parse() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(entry = %raw, "Ignoring unparseable blocked id");
                        continue;
                    }
                },
            };
            if UserId(id) != owner {
                access.blocked.insert(UserId(id));
            }
        }
        access.snapshot = Some(snapshot);
        access
    }

    pub fn is_blocked(&self, user: UserId) -> bool {
        user != self.owner && self.blocked.contains(&user)
    }

    /// Block a user. Returns `true` if they were not blocked before.
    pub async fn block(&mut self, user: UserId) -> Result<bool, AccessError> {
        if user == self.owner {
            return Err(AccessError::SelfBlock(user));
        }
        let inserted = self.blocked.insert(user);
        if inserted {
            info!(user_id = %user, "User blocked");
            self.persist().await;
        }
        Ok(inserted)
    }

    /// Unblock a user. Unblocking someone who is not blocked is a no-op.
    pub async fn unblock(&mut self, user: UserId) -> Result<bool, AccessError> {
        let removed = self.blocked.remove(&user);
        if removed {
            info!(user_id = %user, "User unblocked");
            self.persist().await;
        }
        Ok(removed)
    }

    pub fn list_blocked(&self) -> &BTreeSet<UserId> {
        &self.blocked
    }

    async fn persist(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let entries: Vec<StoredId> = self.blocked.iter().map(|id| StoredId::Int(id.0)).collect();
        if let Err(e) = snapshot.save(&entries).await {
            error!(error = %e, "Failed to persist block list");
        }
    }
}
