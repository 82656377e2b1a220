use bazaar_presence::{IndicatorPatch, ThreadId, UserId};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use super::error::{DecodeSnafu, InvalidIdentifierSnafu, MissingFieldSnafu, RealtimeResult};

/// Inbound event as delivered by the realtime channel.
///
/// Identifiers stay optional here so a malformed event still decodes and can be
/// rejected with a precise reason by [`Signal::try_from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RealtimeEvent {
    UserTyping {
        thread_id: Option<String>,
        user_id: Option<String>,
        user_name: Option<String>,
        #[serde(default)]
        is_typing: bool,
    },
    UserRecording {
        thread_id: Option<String>,
        user_id: Option<String>,
        #[serde(default)]
        is_recording: bool,
        /// Elapsed seconds, as reported by the recording client.
        duration: Option<f64>,
    },
    /// The local user closed the conversation.
    ThreadClosed { thread_id: Option<String> },
}

impl RealtimeEvent {
    /// Decodes one JSON-encoded event.
    pub fn decode(raw: &str) -> RealtimeResult<Self> {
        serde_json::from_str(raw).context(DecodeSnafu {
            stage: "decode-realtime-event",
        })
    }

    pub fn typing(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        is_typing: bool,
    ) -> Self {
        Self::UserTyping {
            thread_id: Some(thread_id.into()),
            user_id: Some(user_id.into()),
            user_name: Some(user_name.into()),
            is_typing,
        }
    }

    pub fn recording(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        is_recording: bool,
        duration: Option<f64>,
    ) -> Self {
        Self::UserRecording {
            thread_id: Some(thread_id.into()),
            user_id: Some(user_id.into()),
            is_recording,
            duration,
        }
    }

    pub fn thread_closed(thread_id: impl Into<String>) -> Self {
        Self::ThreadClosed {
            thread_id: Some(thread_id.into()),
        }
    }
}

/// Validated registry instruction derived from a [`RealtimeEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Indicator {
        thread_id: ThreadId,
        user_id: UserId,
        patch: IndicatorPatch,
    },
    ThreadClosed {
        thread_id: ThreadId,
    },
}

impl TryFrom<&RealtimeEvent> for Signal {
    type Error = super::error::RealtimeError;

    fn try_from(event: &RealtimeEvent) -> RealtimeResult<Self> {
        match event {
            RealtimeEvent::UserTyping {
                thread_id,
                user_id,
                user_name,
                is_typing,
            } => {
                let mut patch = IndicatorPatch::typing(*is_typing);
                if let Some(user_name) = user_name.as_deref().map(str::trim)
                    && !user_name.is_empty()
                {
                    patch = patch.with_name(user_name);
                }
                Ok(Self::Indicator {
                    thread_id: required_id(thread_id.as_deref(), "thread id")?,
                    user_id: required_id(user_id.as_deref(), "user id")?,
                    patch,
                })
            }
            RealtimeEvent::UserRecording {
                thread_id,
                user_id,
                is_recording,
                duration,
            } => Ok(Self::Indicator {
                thread_id: required_id(thread_id.as_deref(), "thread id")?,
                user_id: required_id(user_id.as_deref(), "user id")?,
                patch: IndicatorPatch::recording(*is_recording, duration.and_then(whole_seconds)),
            }),
            RealtimeEvent::ThreadClosed { thread_id } => Ok(Self::ThreadClosed {
                thread_id: required_id(thread_id.as_deref(), "thread id")?,
            }),
        }
    }
}

fn required_id<T>(raw: Option<&str>, field: &'static str) -> RealtimeResult<T>
where
    T: std::str::FromStr<Err = bazaar_presence::PresenceError>,
{
    let raw = raw.unwrap_or_default();
    ensure!(
        !raw.trim().is_empty(),
        MissingFieldSnafu {
            stage: "validate-realtime-event",
            field,
        }
    );
    raw.parse::<T>().context(InvalidIdentifierSnafu {
        stage: "parse-realtime-identifier",
    })
}

fn whole_seconds(duration: f64) -> Option<u32> {
    if duration.is_finite() && duration >= 0.0 {
        Some(duration.min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}
