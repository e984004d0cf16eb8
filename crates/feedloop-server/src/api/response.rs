use serde::Serialize;

/// JSON body of every error answered before a stream starts.
#[derive(Serialize, Debug)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    /// Machine-readable code, shared with stream `error` events
    pub code: String,
}

impl ApiResponse {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.into(),
        }
    }
}
