use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::*;

pub type Properties = Map<String, Value>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    PuzzleStarted,
    PuzzleCompleted,
    PuzzleFailed,
    PuzzleRepeated,
}

impl EventName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PuzzleStarted => "puzzle_started",
            Self::PuzzleCompleted => "puzzle_completed",
            Self::PuzzleFailed => "puzzle_failed",
            Self::PuzzleRepeated => "puzzle_repeated",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Analytics client is not loaded")]
    Unavailable,
    #[error("Analytics client rejected event: {0}")]
    Rejected(String),
}

/// Analytics sink; failures are reported back but never reach the game.
pub trait AnalyticsTransport {
    fn capture(&self, event: &str, properties: &Properties) -> core::result::Result<(), ReportError>;
}

impl<T: AnalyticsTransport + ?Sized> AnalyticsTransport for &T {
    fn capture(&self, event: &str, properties: &Properties) -> core::result::Result<(), ReportError> {
        (**self).capture(event, properties)
    }
}

/// Fields attached to every event of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventContext {
    pub variant: Option<Variant>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub game_session_id: Option<String>,
    pub flag_response: Option<String>,
}

impl EventContext {
    /// Reads the persisted identity, as whatever was last stored.
    pub fn from_storage<S: KeyValueStore + ?Sized>(
        storage: &S,
        game_session_id: Option<&str>,
        flag_response: Option<&str>,
    ) -> Self {
        Self {
            variant: storage.get(VARIANT_KEY).as_deref().and_then(Variant::parse),
            username: storage.get(USERNAME_KEY),
            user_id: storage.get(USER_ID_KEY),
            game_session_id: game_session_id.map(str::to_string),
            flag_response: flag_response.map(str::to_string),
        }
    }

    pub fn properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert("variant".into(), json!(self.variant.map(Variant::as_str)));
        properties.insert("username".into(), json!(self.username));
        properties.insert("user_id".into(), json!(self.user_id));
        properties.insert("game_session_id".into(), json!(self.game_session_id));
        properties.insert("$feature_flag".into(), json!(FEATURE_FLAG_KEY));
        properties.insert("$feature_flag_response".into(), json!(self.flag_response));
        properties
    }
}

/// Seconds rounded to three decimals, as reported in `completion_time_seconds`.
pub fn seconds_3dp(duration: web_time::Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

#[derive(Clone, Debug)]
pub struct EventReporter<A> {
    transport: A,
}

impl<A: AnalyticsTransport> EventReporter<A> {
    pub fn new(transport: A) -> Self {
        Self { transport }
    }

    /// Sends `event` with the context merged under `extra`. Never fails.
    pub fn emit(&self, event: EventName, context: &EventContext, extra: Properties) {
        let mut properties = context.properties();
        properties.extend(extra);

        match self.transport.capture(event.as_str(), &properties) {
            Ok(()) => log::debug!("reported {}", event.as_str()),
            Err(err) => log::error!("failed to report {}: {}", event.as_str(), err),
        }
    }
}
