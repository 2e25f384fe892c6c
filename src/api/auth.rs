use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::crypto::{verify_password, Claims, TokenSubject};
use crate::db::{LoginRequest, LoginResponse, UserResponse};
use crate::AppState;

use super::error::ApiError;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Serialize)]
pub struct LoginFailure {
    pub success: bool,
    pub message: String,
}

fn login_failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(LoginFailure {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCheckResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Response> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(login_failure(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        ));
    }

    let runtime = state
        .runtime()
        .ok_or_else(|| ApiError::not_installed().into_response())?;

    tracing::info!(username = %request.username, "Login attempt");

    let user = runtime
        .db
        .find_user_by_username(request.username.trim())
        .await
        .map_err(|e| ApiError::from(e).into_response())?;

    let user = match user {
        Some(user) if verify_password(&request.password, &user.password) => user,
        _ => {
            tracing::info!(username = %request.username, "Login failed");
            return Err(login_failure(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
        }
    };

    let token = runtime
        .tokens
        .issue(&TokenSubject {
            id: user.id,
            username: &user.username,
            email: &user.email,
            is_admin: user.is_admin,
        })
        .map_err(|e| {
            tracing::error!("Failed to issue token: {}", e);
            ApiError::internal("Internal server error during authentication").into_response()
        })?;

    tracing::info!(username = %user.username, "Login successful");

    Ok(Json(LoginResponse {
        success: true,
        message: "Authentication successful".to_string(),
        token,
        user: UserResponse::from(user),
    }))
}

/// Report whether the request carries a valid, unexpired token
pub async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<AuthCheckResponse> {
    let claims = match (state.runtime(), bearer_token(&headers)) {
        (Some(runtime), Some(token)) => match runtime.tokens.verify(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("Token rejected during auth check: {}", e);
                None
            }
        },
        _ => None,
    };

    Json(match claims {
        Some(claims) => AuthCheckResponse {
            authenticated: true,
            user_id: claims.user_id(),
            username: Some(claims.username),
            is_admin: Some(claims.is_admin),
        },
        None => AuthCheckResponse::default(),
    })
}

/// Auth middleware that verifies bearer tokens and attaches their claims
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;

    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
    let claims = runtime.tokens.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        ApiError::unauthorized("Unauthorized")
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Verified identity of the caller, placed on the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub claims: Claims,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
        let id = claims
            .user_id()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
        Ok(Self { id, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_unauthenticated_check_serializes_minimal() {
        let body = serde_json::to_value(AuthCheckResponse::default()).unwrap();
        assert_eq!(body, serde_json::json!({ "authenticated": false }));
    }
}
