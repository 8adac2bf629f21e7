/// Result alias that carries the custom [`FrameKitError`] type.
pub type Result<T> = std::result::Result<T, FrameKitError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum FrameKitError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a configuration file or frame map.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// `unregister_callback` was handed a callback the clock does not hold.
    #[error("cannot locate the given callback in the frame clock registry")]
    CallbackNotRegistered,
    /// The surface host has no container with the requested id.
    #[error("no container element with id `{0}`")]
    ContainerNotFound(String),
    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An asset load failed or timed out.
    #[error(transparent)]
    Load(#[from] LoadFailure),
}

impl FrameKitError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for FrameKitError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for FrameKitError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Reason a sprite sheet never reached the playing state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadFailure {
    #[error("failed to decode sprite sheet `{url}`: {reason}")]
    Bitmap { url: String, reason: String },
    #[error("frame map request `{url}` did not complete successfully (status {status})")]
    HttpStatus { url: String, status: u16 },
    #[error("frame map `{url}` is not usable: {reason}")]
    FrameMap { url: String, reason: String },
    #[error("assets did not finish loading within {elapsed_ms:.0} ms")]
    TimedOut { elapsed_ms: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failures_render_their_context() {
        let err: FrameKitError = LoadFailure::HttpStatus {
            url: "map.json".to_string(),
            status: 404,
        }
        .into();

        let text = err.to_string();
        assert!(text.contains("map.json"));
        assert!(text.contains("404"));
    }
}
