use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use gardenlink_api::models::{LoginRequest, LoginResponse};
use gardenlink_mock::create_app;
use gardenlink_mock::settings::Settings;
use gardenlink_mock::state::MockState;
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@gardenlink.local";
pub const ADMIN_PASSWORD: &str = "Garden#2024";
pub const STUDENT_EMAIL: &str = "student@gardenlink.local";
pub const STUDENT_PASSWORD: &str = "Student#2024";

pub struct MockApp {
    pub state: MockState,
    pub router: Router,
}

impl MockApp {
    pub fn new() -> Self {
        let settings = Settings::new().unwrap();
        let state = MockState::new(&settings).unwrap();
        let router = create_app(state.clone());

        Self { state, router }
    }

    pub async fn request<T: Serialize>(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&T>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .uri(uri)
            .method(method)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let body = match body {
            Some(body) => Body::from(serde_json::to_string(body).unwrap()),
            None => Body::empty(),
        };

        self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/users/login",
                None,
                Some(&LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let login: LoginResponse = serde_json::from_value(json_body(response).await).unwrap();
        login.token
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
