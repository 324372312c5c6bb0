use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const USER_HEADER: &str = "x-user-id";

// ============================================================================
// Organization Context
// ============================================================================

/// Tenant the request acts on. Every tenant-scoped query filters by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationContext {
    pub organization_id: Uuid,
}

impl OrganizationContext {
    pub fn new(organization_id: Uuid) -> Self {
        Self { organization_id }
    }
}

// ============================================================================
// User Context
// ============================================================================

/// Acting user as asserted by the upstream gateway. Anonymous when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Option<Uuid>,
}

impl AuthenticatedUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// Label used in change logs and audit trails.
    pub fn actor_label(&self) -> String {
        self.user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "system".to_string())
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, String> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| format!("Header {name} is not valid text"))?;
            Uuid::parse_str(raw.trim())
                .map(Some)
                .map_err(|_| format!("Header {name} must be a UUID"))
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Reads tenant and user headers into request extensions.
pub async fn request_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let organization = match header_uuid(request.headers(), ORGANIZATION_HEADER) {
        Ok(org) => org,
        Err(message) => return bad_request(message),
    };
    let user = match header_uuid(request.headers(), USER_HEADER) {
        Ok(user) => user,
        Err(message) => return bad_request(message),
    };

    if let Some(org_id) = organization {
        request
            .extensions_mut()
            .insert(OrganizationContext::new(org_id));
    }

    let user = user
        .map(AuthenticatedUser::new)
        .unwrap_or_else(AuthenticatedUser::anonymous);
    request.extensions_mut().insert(user);

    next.run(request).await
}

// ============================================================================
// Axum Extractors
// ============================================================================

/// Axum extractor for AuthenticatedUser
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .unwrap_or_else(AuthenticatedUser::anonymous))
    }
}

/// Axum extractor for OrganizationContext
#[axum::async_trait]
impl<S> FromRequestParts<S> for OrganizationContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OrganizationContext>()
            .copied()
            .ok_or((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Organization context required"
                })),
            ))
    }
}
