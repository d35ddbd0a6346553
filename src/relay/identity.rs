//! Identity store. Stable anonymous aliases per user.
//!
//! An alias is a fixed prefix followed by N random digits (`USER004217`).
//! Alias → user is a bijection: generation retries on collision and gives up
//! after a bounded number of attempts instead of spinning on a full
//! namespace.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::{error, info};

use crate::error::IdentityError;
use crate::relay::types::UserId;
use crate::store::SnapshotFile;

/// Default alias prefix.
pub const DEFAULT_ALIAS_PREFIX: &str = "USER";

/// Default number of random digits after the prefix.
pub const DEFAULT_ALIAS_DIGITS: u32 = 6;

/// Attempts before alias generation is declared exhausted.
const MAX_GENERATION_ATTEMPTS: u32 = 10_000;

/// Alias format settings.
#[derive(Debug, Clone)]
pub struct AliasFormat {
    pub prefix: String,
    pub digits: u32,
}

impl Default for AliasFormat {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            digits: DEFAULT_ALIAS_DIGITS,
        }
    }
}

impl AliasFormat {
    fn generate(&self, rng: &mut impl Rng) -> String {
        let space = 10u64.saturating_pow(self.digits);
        let n = rng.gen_range(0..space);
        format!("{}{:0width$}", self.prefix, n, width = self.digits as usize)
    }
}

/// Maps user ids to aliases and back.
pub struct IdentityStore {
    format: AliasFormat,
    aliases: BTreeMap<i64, String>,
    by_alias: HashMap<String, UserId>,
    snapshot: Option<SnapshotFile<BTreeMap<i64, String>>>,
}

impl IdentityStore {
    /// An in-memory store with no snapshot file.
    pub fn new(format: AliasFormat) -> Self {
        Self {
            format,
            aliases: BTreeMap::new(),
            by_alias: HashMap::new(),
            snapshot: None,
        }
    }

    /// Load the store from its snapshot file and keep writing back to it.
    pub async fn load(format: AliasFormat, snapshot: SnapshotFile<BTreeMap<i64, String>>) -> Self {
        let aliases = snapshot.load_or_default().await;
        let mut store = Self::new(format);
        for (id, alias) in aliases {
            if store.by_alias.contains_key(&alias) {
                // Keep the bijection: the first owner of a duplicated alias wins.
                error!(user_id = id, alias = %alias, "Duplicate alias in snapshot; dropping");
                continue;
            }
            store.by_alias.insert(alias.clone(), UserId(id));
            store.aliases.insert(id, alias);
        }
        store.snapshot = Some(snapshot);
        store
    }

    /// Return the user's alias, creating and persisting one if needed.
    pub async fn resolve_or_create(&mut self, user: UserId) -> Result<String, IdentityError> {
        if let Some(alias) = self.aliases.get(&user.0) {
            return Ok(alias.clone());
        }

        let alias = self.fresh_alias()?;
        self.aliases.insert(user.0, alias.clone());
        self.by_alias.insert(alias.clone(), user);
        info!(user_id = %user, alias = %alias, "Assigned alias");

        self.persist().await;
        Ok(alias)
    }

    /// The user's alias, if one was assigned.
    pub fn alias_of(&self, user: UserId) -> Option<&str> {
        self.aliases.get(&user.0).map(String::as_str)
    }

    /// Reverse lookup. Matching ignores ASCII case.
    pub fn lookup_user_by_alias(&self, alias: &str) -> Option<UserId> {
        self.by_alias.get(alias).copied().or_else(|| {
            self.by_alias
                .iter()
                .find(|(a, _)| a.eq_ignore_ascii_case(alias))
                .map(|(_, id)| *id)
        })
    }

    pub fn is_registered(&self, user: UserId) -> bool {
        self.aliases.contains_key(&user.0)
    }

    /// All registered users in id order.
    pub fn users(&self) -> impl Iterator<Item = (UserId, &str)> {
        self.aliases
            .iter()
            .map(|(id, alias)| (UserId(*id), alias.as_str()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    fn fresh_alias(&self) -> Result<String, IdentityError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = self.format.generate(&mut rng);
            if !self.by_alias.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(IdentityError::AliasSpaceExhausted {
            attempts: MAX_GENERATION_ATTEMPTS,
        })
    }

    async fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(&self.aliases).await {
                error!(error = %e, "Failed to persist alias map");
            }
        }
    }
}
