use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::Currency;

/// Failure of a remote rate or history lookup.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("upstream answered {status} for {what}")]
    Status { status: u16, what: String },

    #[error("no data for {0}")]
    UnknownCurrency(Currency),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Upstream(#[from] FetchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(json!({"status": "error", "message": self.to_string()})),
        )
            .into_response()
    }
}
