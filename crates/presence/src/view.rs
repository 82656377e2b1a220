use std::collections::HashMap;
use std::fmt;

use super::ids::{ThreadId, UserId};
use super::indicator::{ActivityMode, Indicator};
use super::registry::IndicatorRegistry;

/// Resolves display names for indicators whose event carried none.
pub trait NameResolver: Send + Sync {
    fn display_name(&self, user_id: &UserId) -> Option<String>;
}

/// Map-backed resolver, typically filled from the user directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryNames {
    names: HashMap<UserId, String>,
}

impl DirectoryNames {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(UserId, String)> for DirectoryNames {
    fn from_iter<I: IntoIterator<Item = (UserId, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl NameResolver for DirectoryNames {
    fn display_name(&self, user_id: &UserId) -> Option<String> {
        self.names.get(user_id).cloned()
    }
}

/// Label for an indicator: event name, then resolver, then the raw user id.
pub fn display_name(indicator: &Indicator, resolver: &dyn NameResolver) -> String {
    indicator
        .user_name
        .clone()
        .or_else(|| resolver.display_name(&indicator.user_id))
        .unwrap_or_else(|| indicator.user_id.to_string())
}

/// Read-only projection handed to render surfaces.
pub struct IndicatorView<'a> {
    registry: &'a IndicatorRegistry,
    resolver: &'a dyn NameResolver,
}

impl<'a> IndicatorView<'a> {
    pub fn new(registry: &'a IndicatorRegistry, resolver: &'a dyn NameResolver) -> Self {
        Self { registry, resolver }
    }

    pub fn indicator(&self, thread_id: &ThreadId, user_id: &UserId) -> Option<Indicator> {
        self.registry.get(thread_id, user_id)
    }

    pub fn thread_indicators(&self, thread_id: &ThreadId) -> Vec<Indicator> {
        self.registry.list_for_thread(thread_id)
    }

    pub fn any_active(&self, thread_id: &ThreadId) -> bool {
        self.registry.has_activity(thread_id)
    }

    pub fn summary(&self, thread_id: &ThreadId) -> Option<ActivitySummary> {
        ActivitySummary::from_indicators(&self.thread_indicators(thread_id), self.resolver)
    }
}

/// What a thread header or list row should say about ongoing activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySummary {
    pub mode: ActivityMode,
    /// Display names of the users in `mode`, sorted.
    pub names: Vec<String>,
    /// Only set when a single user is recording.
    pub recording_duration: Option<u32>,
}

impl ActivitySummary {
    /// Recording users take priority; typing users are only reported when nobody records.
    pub fn from_indicators(indicators: &[Indicator], resolver: &dyn NameResolver) -> Option<Self> {
        let recording = indicators
            .iter()
            .filter(|indicator| indicator.mode() == Some(ActivityMode::Recording))
            .collect::<Vec<_>>();

        let (mode, active) = if recording.is_empty() {
            let typing = indicators
                .iter()
                .filter(|indicator| indicator.mode() == Some(ActivityMode::Typing))
                .collect::<Vec<_>>();
            (ActivityMode::Typing, typing)
        } else {
            (ActivityMode::Recording, recording)
        };

        if active.is_empty() {
            return None;
        }

        let recording_duration = match (mode, active.as_slice()) {
            (ActivityMode::Recording, [single]) => single.recording_duration,
            _ => None,
        };
        let mut names = active
            .iter()
            .map(|indicator| display_name(indicator, resolver))
            .collect::<Vec<_>>();
        names.sort();

        Some(Self {
            mode,
            names,
            recording_duration,
        })
    }

    fn subject(&self) -> String {
        match self.names.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, second] => format!("{first} and {second}"),
            [first, rest @ ..] => format!("{first} and {} others", rest.len()),
        }
    }
}

impl fmt::Display for ActivitySummary {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.names.len() == 1 { "is" } else { "are" };
        let subject = self.subject();
        match self.mode {
            ActivityMode::Typing => write!(formatter, "{subject} {verb} typing…"),
            ActivityMode::Recording => {
                write!(formatter, "{subject} {verb} recording audio")?;
                if let Some(seconds) = self.recording_duration {
                    write!(formatter, " ({}:{:02})", seconds / 60, seconds % 60)?;
                }
                Ok(())
            }
        }
    }
}
