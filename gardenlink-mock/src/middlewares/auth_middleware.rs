use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, Header};

use crate::error::MockError;
use crate::state::MockState;

/// Resolves the bearer token to a live session and stores it as an extension.
pub async fn auth(
    State(state): State<MockState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<impl IntoResponse, MockError> {
    let token = bearer_token(&req).ok_or(MockError::InvalidSession)?;

    let session = state
        .authenticate(&token)
        .await
        .ok_or(MockError::InvalidSession)?;

    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}

pub fn bearer_token<B>(req: &Request<B>) -> Option<String> {
    let mut headers = req.headers().get_all(header::AUTHORIZATION).iter();
    let header: Authorization<Bearer> = Authorization::decode(&mut headers).ok()?;

    Some(header.token().to_string())
}
