//! Protobuf request extractor and response body.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

pub const CONTENT_TYPE_PROTOBUF: &str = "application/octet-stream";

/// Protobuf-encoded body. Extracts like `Json<T>` and responds with the
/// encoded message.
#[derive(Debug, Clone)]
pub struct Protobuf<T>(pub T);

impl<S, T> FromRequest<S> for Protobuf<T>
where
    S: Send + Sync,
    T: prost::Message + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        T::decode(bytes).map(Protobuf).map_err(|e| {
            tracing::debug!(%e, "malformed protobuf body");
            ApiError::bad_request("Error unmarshalling request body")
        })
    }
}

impl<T: prost::Message> IntoResponse for Protobuf<T> {
    fn into_response(self) -> Response {
        (
            [(CONTENT_TYPE, CONTENT_TYPE_PROTOBUF)],
            self.0.encode_to_vec(),
        )
            .into_response()
    }
}

/// Protobuf body with an explicit status.
pub fn with_status<T: prost::Message>(status: StatusCode, body: T) -> Response {
    (status, Protobuf(body)).into_response()
}
