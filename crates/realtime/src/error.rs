use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RealtimeError {
    #[snafu(display("realtime event is missing its {field} on `{stage}`"))]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("realtime event has an invalid identifier on `{stage}`: {source}"))]
    InvalidIdentifier {
        stage: &'static str,
        source: bazaar_presence::PresenceError,
    },
    #[snafu(display("failed to decode realtime event on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
