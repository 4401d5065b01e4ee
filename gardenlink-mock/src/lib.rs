use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handles::*;
use crate::settings::Settings;
use crate::state::MockState;

pub mod error;
pub mod handles;
pub mod middlewares;
pub mod settings;
pub mod simulate;
pub mod state;

pub fn create_app(state: MockState) -> Router {
    Router::new()
        .merge(user_router(state.clone()))
        .merge(output_router(state.clone()))
        .merge(pzem_router(state.clone()))
        .merge(stream_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the backend on an already bound listener.
pub async fn serve(listener: TcpListener, state: MockState) -> std::io::Result<()> {
    axum::serve(listener, create_app(state)).await
}

/// Runs the simulation clock: a full simulated day passes every 180 ticks.
pub async fn run_simulation(state: MockState, tick: Duration) {
    const TICKS_PER_DAY: u64 = 180;

    let mut interval = tokio::time::interval(tick);
    let mut index: u64 = 0;
    loop {
        interval.tick().await;

        let day_fraction = (index % TICKS_PER_DAY) as f64 / TICKS_PER_DAY as f64;
        simulate::step(&state, day_fraction, tick.as_secs_f64() / 3600.0, OffsetDateTime::now_utc()).await;

        index += 1;
    }
}

pub async fn run(settings: &Arc<Settings>) {
    let state = MockState::new(settings).expect("Failed to create mock state");

    tokio::spawn(run_simulation(state.clone(), Duration::from_secs(settings.mock.tick_secs.max(1))));

    let ip_addr = settings.server.host.parse::<IpAddr>().expect("Invalid server host");
    let address = SocketAddr::from((ip_addr, settings.server.port));
    let listener = TcpListener::bind(&address).await.expect("Failed to bind listener");

    tracing::info!("listening on {:?}", address);

    if let Err(e) = serve(listener, state).await {
        tracing::error!("server stopped: {}", e);
    }
}
