//! Request extractors

use axum::extract::{FromRequest, Request};
use axum::Json;
use rstuf_core::{Validate, ValidationErrors};
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// JSON body that was decoded and passed [`Validate`]
///
/// Decoding and validation failures both become 422 responses.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ValidationErrors::malformed_body(rejection.body_text()))?;
        value.validated()?;
        Ok(Self(value))
    }
}
