//! Request body extraction.

use super::error::ApiError;
use crate::Error;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header;
use axum::{Form, Json};
use serde::de::DeserializeOwned;

/// A request body decoded as JSON or as an urlencoded form.
///
/// The `Content-Type` header picks the decoder. An empty body decodes as
/// `{}`, so types whose fields are all optional accept it and types with
/// required fields reject it with a 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        if content_type.as_deref().is_some_and(is_form) {
            let Form(value) = Form::<T>::from_request(req, state).await?;
            return Ok(Self(value));
        }

        let body = Bytes::from_request(req, state).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_slice(b"{}")
                .map(Self)
                .map_err(|e| ApiError(Error::InvalidInput(e.to_string())));
        }

        if !content_type.as_deref().is_some_and(is_json) {
            return Err(ApiError(Error::InvalidInput(
                "Expected request with `Content-Type: application/json`".to_string(),
            )));
        }

        let Json(value) = Json::<T>::from_bytes(&body)?;
        Ok(Self(value))
    }
}

fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn is_form(content_type: &str) -> bool {
    essence(content_type).eq_ignore_ascii_case("application/x-www-form-urlencoded")
}

fn is_json(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.eq_ignore_ascii_case("application/json")
        || essence.rsplit_once('+').is_some_and(|(kind, suffix)| {
            kind.to_ascii_lowercase().starts_with("application/")
                && suffix.eq_ignore_ascii_case("json")
        })
}
