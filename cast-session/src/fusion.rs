//! Fuses receiver status and media status into one casting signal.
//!
//! [`StatusFusion`] is plain state with no I/O. The controller feeds it every
//! status it receives and acts on what comes back: join a new application,
//! drop a stale media session, republish casting or volume.

use tracing::{debug, info};

use crate::status::{CastingApplication, MediaStatus, ReceiverStatus};

/// What the controller must do after a receiver status was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverUpdate {
    /// A new foreground application that should be joined
    pub join: Option<CastingApplication>,
    /// The current media session no longer belongs to the foreground app
    pub detach_media: bool,
    /// New casting value, set only when it changed
    pub casting: Option<bool>,
    /// New volume level, set only when it changed
    pub volume: Option<f32>,
}

#[derive(Debug, Default)]
pub struct StatusFusion {
    application: Option<CastingApplication>,
    media_attached: bool,
    casting: bool,
    volume: Option<f32>,
}

impl StatusFusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_casting(&self) -> bool {
        self.casting
    }

    pub fn application(&self) -> Option<&CastingApplication> {
        self.application.as_ref()
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.application.as_ref().map(|app| app.session_id.as_str())
    }

    pub fn has_media(&self) -> bool {
        self.media_attached
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    /// Apply a receiver status.
    ///
    /// A foreground application with a session id different from the tracked
    /// one is returned for joining. No foreground application, whether the
    /// list is empty or absent, means casting is over.
    pub fn apply_receiver_status(&mut self, status: &ReceiverStatus) -> ReceiverUpdate {
        let mut update = ReceiverUpdate::default();

        match status.foreground_application() {
            Some(app) => {
                if self.current_session_id() != Some(app.session_id.as_str()) {
                    let application = CastingApplication::from(app);
                    debug!(
                        session_id = %application.session_id,
                        app = ?application.display_name,
                        "New foreground application"
                    );
                    update.detach_media = self.media_attached;
                    self.media_attached = false;
                    self.application = Some(application.clone());
                    update.join = Some(application);
                }
            }
            None => {
                update.detach_media = self.media_attached;
                if let Some(previous) = self.application.take() {
                    debug!(session_id = %previous.session_id, "Application left the foreground");
                }
                self.media_attached = false;
                if status.applications_absent() && self.casting {
                    info!("Receiver reports no applications, casting stopped");
                }
                update.casting = self.set_casting(false);
            }
        }

        if let Some(level) = status.volume_level() {
            if self.volume != Some(level) {
                self.volume = Some(level);
                update.volume = Some(level);
            }
        }

        update
    }

    /// Record that the media channel for `session_id` is open.
    ///
    /// Returns false when `session_id` is no longer the tracked application.
    pub fn attach_media(&mut self, session_id: &str) -> bool {
        if self.current_session_id() == Some(session_id) {
            self.media_attached = true;
            true
        } else {
            false
        }
    }

    /// Apply a media status for `session_id`.
    ///
    /// Statuses for any other session, or without a player state, are ignored.
    /// Returns the new casting value when it changed.
    pub fn apply_media_status(&mut self, session_id: &str, status: &MediaStatus) -> Option<bool> {
        if !self.media_attached || self.current_session_id() != Some(session_id) {
            debug!(session_id, "Ignoring media status for untracked session");
            return None;
        }

        let state = status.player_state.as_ref()?;
        self.set_casting(state.is_active())
    }

    /// Forget the application and media session and force casting off.
    pub fn reset(&mut self) -> Option<bool> {
        self.application = None;
        self.media_attached = false;
        self.set_casting(false)
    }

    fn set_casting(&mut self, casting: bool) -> Option<bool> {
        if self.casting == casting {
            None
        } else {
            self.casting = casting;
            Some(casting)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Application, PlayerState, VolumeStatus};
    use proptest::prelude::*;

    fn status_with_app(session_id: &str) -> ReceiverStatus {
        ReceiverStatus {
            applications: Some(vec![Application {
                session_id: session_id.to_string(),
                display_name: Some("Spotify".to_string()),
                ..Default::default()
            }]),
            volume: None,
        }
    }

    fn joined(fusion: &mut StatusFusion, session_id: &str) {
        let update = fusion.apply_receiver_status(&status_with_app(session_id));
        assert!(update.join.is_some());
        assert!(fusion.attach_media(session_id));
    }

    #[test]
    fn test_empty_applications_publish_nothing_initially() {
        let mut fusion = StatusFusion::new();
        let update = fusion.apply_receiver_status(&ReceiverStatus {
            applications: Some(vec![]),
            volume: None,
        });
        assert_eq!(update, ReceiverUpdate::default());
        assert!(!fusion.is_casting());
    }

    #[test]
    fn test_new_session_is_joined_once() {
        let mut fusion = StatusFusion::new();
        let update = fusion.apply_receiver_status(&status_with_app("abc"));
        let application = update.join.unwrap();
        assert_eq!(application.session_id, "abc");
        assert_eq!(application.transport_id, "abc");

        let update = fusion.apply_receiver_status(&status_with_app("abc"));
        assert!(update.join.is_none());
        assert!(!update.detach_media);
    }

    #[test]
    fn test_playing_then_absent_applications() {
        let mut fusion = StatusFusion::new();
        joined(&mut fusion, "abc");

        let casting =
            fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Playing));
        assert_eq!(casting, Some(true));

        let update = fusion.apply_receiver_status(&ReceiverStatus::default());
        assert_eq!(update.casting, Some(false));
        assert!(update.detach_media);
        assert!(fusion.application().is_none());
        assert!(!fusion.has_media());
    }

    #[test]
    fn test_superseding_session_detaches_media() {
        let mut fusion = StatusFusion::new();
        joined(&mut fusion, "abc");

        let update = fusion.apply_receiver_status(&status_with_app("def"));
        assert!(update.detach_media);
        assert_eq!(update.join.unwrap().session_id, "def");

        let casting =
            fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Playing));
        assert_eq!(casting, None);
    }

    #[test]
    fn test_media_status_without_player_state_is_ignored() {
        let mut fusion = StatusFusion::new();
        joined(&mut fusion, "abc");
        fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Buffering));

        assert_eq!(fusion.apply_media_status("abc", &MediaStatus::default()), None);
        assert!(fusion.is_casting());

        assert_eq!(
            fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Paused)),
            Some(false)
        );
    }

    #[test]
    fn test_media_status_before_attach_is_ignored() {
        let mut fusion = StatusFusion::new();
        fusion.apply_receiver_status(&status_with_app("abc"));
        let casting =
            fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Playing));
        assert_eq!(casting, None);
    }

    #[test]
    fn test_volume_reported_only_on_change() {
        let mut fusion = StatusFusion::new();
        let status = ReceiverStatus {
            applications: Some(vec![]),
            volume: Some(VolumeStatus {
                level: Some(0.4),
                muted: Some(false),
            }),
        };
        assert_eq!(fusion.apply_receiver_status(&status).volume, Some(0.4));
        assert_eq!(fusion.apply_receiver_status(&status).volume, None);
        assert_eq!(fusion.volume(), Some(0.4));
    }

    #[test]
    fn test_reset_forces_false() {
        let mut fusion = StatusFusion::new();
        joined(&mut fusion, "abc");
        fusion.apply_media_status("abc", &MediaStatus::with_player_state(PlayerState::Playing));

        assert_eq!(fusion.reset(), Some(false));
        assert_eq!(fusion.reset(), None);
        assert!(fusion.current_session_id().is_none());
    }

    #[derive(Debug, Clone)]
    enum Input {
        Receiver(Option<Vec<String>>),
        Media(String, Option<PlayerState>),
    }

    fn player_state() -> impl Strategy<Value = Option<PlayerState>> {
        prop_oneof![
            Just(None),
            Just(Some(PlayerState::Playing)),
            Just(Some(PlayerState::Buffering)),
            Just(Some(PlayerState::Paused)),
            Just(Some(PlayerState::Idle)),
        ]
    }

    fn input() -> impl Strategy<Value = Input> {
        let session = prop_oneof![Just("a".to_string()), Just("b".to_string())];
        prop_oneof![
            proptest::option::of(proptest::collection::vec(session.clone(), 0..2))
                .prop_map(Input::Receiver),
            (session, player_state()).prop_map(|(id, state)| Input::Media(id, state)),
        ]
    }

    proptest! {
        #[test]
        fn casting_only_while_an_application_is_foregrounded(inputs in proptest::collection::vec(input(), 1..40)) {
            let mut fusion = StatusFusion::new();
            for input in inputs {
                match input {
                    Input::Receiver(sessions) => {
                        let status = ReceiverStatus {
                            applications: sessions.map(|ids| {
                                ids.into_iter()
                                    .map(|session_id| Application { session_id, ..Default::default() })
                                    .collect()
                            }),
                            volume: None,
                        };
                        if let Some(app) = fusion.apply_receiver_status(&status).join {
                            fusion.attach_media(&app.session_id);
                        }
                        if status.foreground_application().is_none() {
                            prop_assert!(!fusion.is_casting());
                        }
                    }
                    Input::Media(session_id, state) => {
                        fusion.apply_media_status(&session_id, &MediaStatus {
                            player_state: state,
                            ..Default::default()
                        });
                    }
                }
                if fusion.is_casting() {
                    prop_assert!(fusion.application().is_some());
                }
            }
        }
    }
}
