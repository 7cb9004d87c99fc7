//! Principal extraction.
//!
//! Authentication happens in the gateway in front of this service, which
//! forwards the authenticated identity in the `X-Principal-Id` header.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AtlasError;
use crate::model::PrincipalId;

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// The requesting principal. Rejects with 401 when the header is missing,
/// empty or not valid UTF-8.
#[derive(Debug, Clone)]
pub struct Principal(pub PrincipalId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AtlasError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .ok_or_else(|| AtlasError::unauthorized("Missing principal"))?;

        let id = value
            .to_str()
            .map_err(|_| AtlasError::unauthorized("Malformed principal"))?
            .trim();

        if id.is_empty() {
            return Err(AtlasError::unauthorized("Missing principal"));
        }

        Ok(Principal(PrincipalId::new(id)))
    }
}
