//! Status payloads reported by a cast receiver.
//!
//! Two independent status streams exist. Receiver status is device-wide and
//! lists the foregrounded application(s) and the volume. Media status is per
//! joined application session and carries the player state.
//!
//! Absence matters: a receiver status with no `applications` key at all is
//! the device's "nothing is being cast" signal and must be kept distinct from
//! an empty list, so the field is an `Option<Vec<_>>`.

use serde::{Deserialize, Serialize};

/// Device-level receiver status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<Vec<Application>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeStatus>,
}

impl ReceiverStatus {
    /// The foregrounded application, if any.
    pub fn foreground_application(&self) -> Option<&Application> {
        self.applications.as_ref()?.first()
    }

    /// True when the `applications` field was absent from the payload.
    pub fn applications_absent(&self) -> bool {
        self.applications.is_none()
    }

    /// Reported volume level in `[0, 1]`, if present.
    pub fn volume_level(&self) -> Option<f32> {
        self.volume
            .as_ref()
            .and_then(|volume| volume.level)
            .map(|level| level.clamp(0.0, 1.0))
    }
}

/// One running application as listed in a receiver status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub session_id: String,
    /// Frequently missing for speaker groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

/// Volume block of a receiver status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// The application session being tracked and joined.
///
/// `transport_id` always equals `session_id`. Grouped speakers omit the
/// transport id from their status, and the session id is what they accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastingApplication {
    pub session_id: String,
    pub transport_id: String,
    pub app_id: Option<String>,
    pub display_name: Option<String>,
}

impl From<&Application> for CastingApplication {
    fn from(application: &Application) -> Self {
        Self {
            session_id: application.session_id.clone(),
            transport_id: application.session_id.clone(),
            app_id: application.app_id.clone(),
            display_name: application.display_name.clone(),
        }
    }
}

/// Per-session media status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_session_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<PlayerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_reason: Option<String>,
}

impl MediaStatus {
    pub fn with_player_state(state: PlayerState) -> Self {
        Self {
            player_state: Some(state),
            ..Default::default()
        }
    }
}

/// Player state of a media session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlayerState {
    Playing,
    Buffering,
    Paused,
    Idle,
    Unknown(String),
}

impl PlayerState {
    /// Whether this state counts as "casting".
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }
}

impl From<String> for PlayerState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PLAYING" => PlayerState::Playing,
            "BUFFERING" => PlayerState::Buffering,
            "PAUSED" => PlayerState::Paused,
            "IDLE" => PlayerState::Idle,
            _ => PlayerState::Unknown(value),
        }
    }
}

impl From<PlayerState> for String {
    fn from(state: PlayerState) -> Self {
        match state {
            PlayerState::Playing => "PLAYING".to_string(),
            PlayerState::Buffering => "BUFFERING".to_string(),
            PlayerState::Paused => "PAUSED".to_string(),
            PlayerState::Idle => "IDLE".to_string(),
            PlayerState::Unknown(other) => other,
        }
    }
}
