use std::net::SocketAddr;
use std::time::Duration;

use gardenlink_client::GardenClient;
use gardenlink_client::configs::Settings;
use gardenlink_mock::state::MockState;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub const SECRET: &str = "gardenlink-key16";
pub const ADMIN_EMAIL: &str = "admin@gardenlink.local";
pub const ADMIN_PASSWORD: &str = "Garden#2024";
pub const STUDENT_EMAIL: &str = "student@gardenlink.local";
pub const STUDENT_PASSWORD: &str = "Student#2024";

/// Starts the mock backend on a free local port without the simulation clock.
pub async fn spawn_backend() -> (SocketAddr, MockState) {
    let settings = gardenlink_mock::settings::Settings::new().unwrap();
    let state = MockState::new(&settings).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(gardenlink_mock::serve(listener, state.clone()));

    (addr, state)
}

pub fn client_for(addr: SocketAddr) -> GardenClient {
    let settings = Settings::from_toml(&format!(
        r#"
        [api]
        host = "{addr}"
        secure = false

        [crypto]
        secret = "{SECRET}"

        [stream]
        delay_ms = 100
        "#
    ))
    .unwrap();

    GardenClient::from_settings(&settings).unwrap()
}

pub async fn signed_in_client(addr: SocketAddr, email: &str, password: &str) -> GardenClient {
    let client = client_for(addr);
    client.account().login(email, password).await.unwrap();
    client
}

/// Waits until the view satisfies `predicate`, failing the test after five seconds.
pub async fn wait_for<V>(view: &mut watch::Receiver<V>, predicate: impl FnMut(&V) -> bool) -> V
where
    V: Clone,
{
    tokio::time::timeout(Duration::from_secs(5), view.wait_for(predicate))
        .await
        .expect("view did not reach the expected state")
        .expect("view sender dropped")
        .clone()
}
