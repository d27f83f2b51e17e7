//! JSON extractor that rejects with an [AppError] instead of axum's plain-text rejection.

use crate::error::AppError;
use axum::response::{IntoResponse, Response};
use axum_macros::FromRequest;
use serde::Serialize;

/// Like [axum::Json], but malformed bodies become a JSON [AppError].
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
