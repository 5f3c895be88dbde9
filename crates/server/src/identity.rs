//! Request identity extracted from gateway headers.
//!
//! The server sits behind a gateway that authenticates callers and forwards
//! their identity as headers. Nothing here is verified cryptographically;
//! the gateway is trusted, and the permission tokens it forwards are the
//! sole authorization input.

use crate::error::ApiError;
use alcove_core::Tenant;
use alcove_core::permission::PermissionSet;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

/// Tenant the request operates on. Required.
pub const TENANT_HEADER: &str = "x-settings-tenant";
/// Id of the calling user. Optional; absent for service calls.
pub const USER_HEADER: &str = "x-settings-user-id";
/// JSON array of permission token strings. Optional.
pub const PERMISSIONS_HEADER: &str = "x-settings-permissions";

/// The authenticated caller of one request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub tenant: Tenant,
    pub caller: Option<Uuid>,
    pub permissions: PermissionSet,
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("header '{name}' is not valid UTF-8"))),
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = header_str(parts, TENANT_HEADER)?
            .ok_or_else(|| ApiError::BadRequest(format!("missing '{TENANT_HEADER}' header")))?;
        let tenant = Tenant::parse(tenant)?;

        let caller = match header_str(parts, USER_HEADER)? {
            None => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ApiError::BadRequest(format!("header '{USER_HEADER}' is not a UUID"))
            })?),
        };

        // Unknown or foreign tokens in the array are ignored, but the array
        // itself must be well-formed JSON.
        let permissions = match header_str(parts, PERMISSIONS_HEADER)? {
            None => PermissionSet::default(),
            Some(raw) => {
                let tokens: Vec<String> = serde_json::from_str(raw).map_err(|_| {
                    ApiError::BadRequest(format!(
                        "header '{PERMISSIONS_HEADER}' must be a JSON array of strings"
                    ))
                })?;
                PermissionSet::from_tokens(tokens)
            }
        };

        Ok(Self {
            tenant,
            caller,
            permissions,
        })
    }
}
