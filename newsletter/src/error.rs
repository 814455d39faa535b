use derive_more::derive::Display;
use reqwest::StatusCode;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Display)]
pub enum AppError {
    #[display("bad request: {_0}")]
    BadRequest(String),
    #[display("unauthorized: {_0}")]
    Unauthorized(String),
    #[display("request timed out")]
    RequestTimeout,
    #[display("too many requests")]
    TooManyRequests,
    #[display("missing API key ({_0})")]
    MissingApiKey(&'static str),
    #[display("empty response")]
    EmptyResponse,
    #[display("{_0}")]
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(error.into())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        match error.status() {
            Some(status) => from_status(status, error.to_string()),
            None if error.is_timeout() => AppError::RequestTimeout,
            None => AppError::Internal(error.into()),
        }
    }
}

/// Maps a non-success HTTP status from a completion backend onto an error.
pub fn from_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::BAD_REQUEST => AppError::BadRequest(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT => AppError::RequestTimeout,
        StatusCode::TOO_MANY_REQUESTS => AppError::TooManyRequests,
        _ => AppError::Internal(anyhow::anyhow!("HTTP {}: {}", status, message)),
    }
}

/// OAuth token exchange failures.
#[derive(Debug, Display)]
pub enum AuthError {
    #[display("token has been expired or revoked")]
    ExpiredOrRevoked,
    #[display("unexpected OAuth response")]
    BadOauthResponse,
    #[display("{_0}")]
    Unexpected(String),
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AppError::TooManyRequests
        ));
        assert!(matches!(
            from_status(StatusCode::UNAUTHORIZED, "bad key".to_string()),
            AppError::Unauthorized(m) if m == "bad key"
        ));
        assert!(matches!(
            from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AppError::MissingApiKey("OPENAI_API_KEY").to_string(),
            "missing API key (OPENAI_API_KEY)"
        );
        assert_eq!(AppError::EmptyResponse.to_string(), "empty response");
    }
}
