use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures reported by the fullscreen / native picture-in-picture host
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresentationError {
    #[error("picture-in-picture is not available")]
    PictureInPictureUnavailable,
    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("visit {0} not found")]
    VisitNotFound(String),
    #[error("device imei is missing")]
    MissingImei,
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
    #[error("invalid quality: {0}")]
    InvalidQuality(String),
    #[error("failed to encode visit state: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::VisitNotFound(_) => StatusCode::NOT_FOUND,
            WebError::MissingImei | WebError::InvalidChannel(_) | WebError::InvalidQuality(_) => {
                StatusCode::BAD_REQUEST
            }
            WebError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "code": status.as_u16(),
            "message": self.to_string(),
            "data": null
        });
        (status, Json(body)).into_response()
    }
}
