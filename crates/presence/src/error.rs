use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PresenceError {
    #[snafu(display("presence id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("indicator registry requires a tokio runtime on `{stage}`: {source}"))]
    NoRuntime {
        stage: &'static str,
        source: tokio::runtime::TryCurrentError,
    },
}

pub type PresenceResult<T> = Result<T, PresenceError>;
