use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use axum_extra::TypedHeader;
use axum_extra::headers::UserAgent;
use gardenlink_api::models::*;
use serde_json::{Value, json};

use crate::error::MockError;
use crate::middlewares::{auth, bearer_token};
use crate::state::{MockState, Session};

pub fn user_router(state: MockState) -> Router {
    let protected = Router::new()
        .route("/api/users/logout", post(logout))
        .route("/api/users/account", get(get_account))
        .route("/api/users/edit", put(edit_account))
        .route("/api/users/change-password", put(change_password))
        .route("/api/users/remote-logout", post(remote_logout))
        .route("/api/users/validate-password", post(validate_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/api/users/login", post(login))
        .route("/api/users/token/validator", post(validate_token))
        .merge(protected)
        .with_state(state)
}

pub async fn login(
    State(state): State<MockState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, MockError> {
    let user = {
        let store = state.store.read().await;
        store
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(body.email.trim()) && user.password == body.password)
            .cloned()
            .ok_or(MockError::InvalidCredentials)?
    };

    let device = user_agent
        .map(|TypedHeader(agent)| agent.as_str().to_string())
        .unwrap_or_else(|| "Unknown device".to_string());
    let session = state.sign_in(&user, device).await;

    {
        let mut store = state.store.write().await;
        state.log(&mut store, format!("{} signed in", user.email));
    }
    tracing::info!(user = %user.email, "signed in");

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        role: session.role,
    }))
}

pub async fn validate_token(
    State(state): State<MockState>,
    req: Request<Body>,
) -> Json<TokenValidation> {
    let session = match bearer_token(&req) {
        Some(token) => state.authenticate(&token).await,
        None => None,
    };

    Json(match session {
        Some(session) => TokenValidation {
            valid: true,
            role: session.role,
        },
        None => TokenValidation {
            valid: false,
            role: Role::Guest,
        },
    })
}

pub async fn logout(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
) -> Json<Value> {
    state
        .end_sessions(&session.user_id, |candidate| candidate.token == session.token)
        .await;

    Json(json!({ "message": "Logged out" }))
}

pub async fn get_account(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
) -> Result<Json<AccountResponse>, MockError> {
    let store = state.store.read().await;
    let user = store.user(&session.user_id).ok_or(MockError::NotFound("User"))?;

    Ok(Json(AccountResponse {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    }))
}

pub async fn edit_account(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Json(body): Json<EditAccountRequest>,
) -> Result<Json<AccountResponse>, MockError> {
    let mut store = state.store.write().await;

    if let Some(email) = &body.email {
        let taken = store
            .users
            .iter()
            .any(|user| user.id != session.user_id && user.email.eq_ignore_ascii_case(email));
        if taken {
            return Err(MockError::EmailExists);
        }
    }

    let user = store.user_mut(&session.user_id).ok_or(MockError::NotFound("User"))?;
    if let Some(name) = body.name {
        user.name = Some(name);
    }
    if let Some(email) = body.email {
        user.email = email;
    }

    let response = AccountResponse {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    };
    state.log(&mut store, format!("{} updated the account", response.email));

    Ok(Json(response))
}

pub async fn change_password(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, MockError> {
    let mut store = state.store.write().await;
    let user = store.user_mut(&session.user_id).ok_or(MockError::NotFound("User"))?;

    if user.password != body.old_password {
        return Err(MockError::WrongPassword);
    }
    if body.new_password.len() < 8 {
        return Err(MockError::InvalidRequest("Password must be at least 8 characters".into()));
    }
    user.password = body.new_password;

    Ok(Json(json!({ "message": "Password changed" })))
}

pub async fn remote_logout(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Json(body): Json<RemoteLogoutRequest>,
) -> Result<Json<Value>, MockError> {
    let ended = state
        .end_sessions(&session.user_id, |candidate| candidate.record.id == body.session_id)
        .await;
    if ended == 0 {
        return Err(MockError::NotFound("Session"));
    }

    Ok(Json(json!({ "message": "Session signed out" })))
}

pub async fn validate_password(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Json(body): Json<ValidatePasswordRequest>,
) -> Result<Json<Value>, MockError> {
    let store = state.store.read().await;
    let user = store.user(&session.user_id).ok_or(MockError::NotFound("User"))?;

    Ok(Json(json!({ "valid": user.password == body.password })))
}
