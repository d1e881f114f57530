pub mod config;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bazaar_api::state::AppStateInner;
use bazaar_gateway::Gateway;
use bazaar_gateway::connection;

/// Used when `RUST_LOG` is unset. Names every crate of the server.
pub const DEFAULT_LOG_FILTER: &str =
    "bazaar=debug,bazaar_server=debug,bazaar_api=debug,bazaar_gateway=debug,bazaar_db=debug,tower_http=debug";

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// The full HTTP surface: public health check, bearer-protected REST routes
/// and the live gateway.
pub fn router(gateway: Gateway) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway.clone());

    Router::new()
        .merge(public_routes)
        .merge(bazaar_api::routes(AppStateInner::new(gateway)))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as `?token=`. The header wins when both are present.
async fn ws_upgrade(
    State(gateway): State<Gateway>,
    Query(query): Query<GatewayQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = bearer
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or(query.token);

    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, token))
}
