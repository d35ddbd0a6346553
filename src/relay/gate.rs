//! Shared-password gate for the broadcast room (`config.json`).

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::store::SnapshotFile;

/// Persisted room settings. Unknown fields are ignored, missing ones default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub require_password: bool,
    pub password: String,
}

/// The room's password gate.
pub struct RoomGate {
    settings: RoomSettings,
    snapshot: Option<SnapshotFile<RoomSettings>>,
}

impl RoomGate {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            snapshot: None,
        }
    }

    pub async fn load(snapshot: SnapshotFile<RoomSettings>) -> Self {
        let settings = snapshot.load_or_default().await;
        Self {
            settings,
            snapshot: Some(snapshot),
        }
    }

    /// Whether newcomers must enter the password.
    pub fn is_enabled(&self) -> bool {
        self.settings.require_password
    }

    /// Plain equality against the configured password. An open room admits
    /// everyone.
    pub fn check(&self, candidate: &str) -> bool {
        !self.settings.require_password || candidate == self.settings.password
    }

    pub async fn set_password(&mut self, word: &str) {
        self.settings = RoomSettings {
            require_password: true,
            password: word.to_string(),
        };
        info!("Room password enabled");
        self.persist().await;
    }

    pub async fn disable(&mut self) {
        self.settings = RoomSettings::default();
        info!("Room password disabled");
        self.persist().await;
    }

    async fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(&self.settings).await {
                error!(error = %e, "Failed to persist room settings");
            }
        }
    }
}
