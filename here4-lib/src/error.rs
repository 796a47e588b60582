#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A frame without payload has no tail byte to decode.
    #[error("empty payload; no tail byte")]
    EmptyPayload,
    #[error("not enough bytes: got {actual}, need {minimum}")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The transport will not deliver anything else, e.g., end of a replay.
    #[error("transport disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{sink} sink is closed")]
    SinkClosed { sink: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
