use tokio::time::Instant;

use super::ids::{ThreadId, UserId};

/// Activity a user is currently broadcasting in one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityMode {
    Typing,
    Recording,
}

/// Transient typing/recording state for one user in one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub is_typing: bool,
    pub is_recording: bool,
    /// Elapsed recording time in seconds, only set while recording.
    pub recording_duration: Option<u32>,
    pub updated_at: Instant,
}

impl Indicator {
    /// Creates an idle indicator that holds no activity yet.
    pub fn idle(thread_id: ThreadId, user_id: UserId, now: Instant) -> Self {
        Self {
            thread_id,
            user_id,
            user_name: None,
            is_typing: false,
            is_recording: false,
            recording_duration: None,
            updated_at: now,
        }
    }

    /// Returns the active mode, or `None` when the indicator carries no activity.
    ///
    /// Recording is checked first so a malformed state still reports the dominant mode.
    pub fn mode(&self) -> Option<ActivityMode> {
        if self.is_recording {
            Some(ActivityMode::Recording)
        } else if self.is_typing {
            Some(ActivityMode::Typing)
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode().is_some()
    }

    /// Merges a partial update and re-derives the mutually exclusive flags.
    pub fn apply(&mut self, patch: &IndicatorPatch, now: Instant) {
        if let Some(is_typing) = patch.is_typing {
            self.is_typing = is_typing;
        }
        if let Some(is_recording) = patch.is_recording {
            self.is_recording = is_recording;
        }
        if patch.recording_duration.is_some() {
            self.recording_duration = patch.recording_duration;
        }
        if let Some(user_name) = &patch.user_name {
            let user_name = user_name.trim();
            if !user_name.is_empty() {
                self.user_name = Some(user_name.to_string());
            }
        }

        // Recording wins: a typing signal seen while recording is dropped.
        if self.is_recording {
            self.is_typing = false;
        } else {
            self.recording_duration = None;
        }

        self.updated_at = now;
    }
}

/// Partial indicator state carried by one inbound signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndicatorPatch {
    pub is_typing: Option<bool>,
    pub is_recording: Option<bool>,
    pub recording_duration: Option<u32>,
    pub user_name: Option<String>,
}

impl IndicatorPatch {
    pub fn typing(is_typing: bool) -> Self {
        Self {
            is_typing: Some(is_typing),
            ..Self::default()
        }
    }

    pub fn recording(is_recording: bool, recording_duration: Option<u32>) -> Self {
        Self {
            is_recording: Some(is_recording),
            recording_duration: recording_duration.filter(|_| is_recording),
            ..Self::default()
        }
    }

    /// Clears both activity flags, the same as an explicit "stopped" signal.
    pub fn stopped() -> Self {
        Self {
            is_typing: Some(false),
            is_recording: Some(false),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}
