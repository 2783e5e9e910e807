use crate::handlers::{exchange, info};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/info", get(info::get_info))
        .route("/exchange", post(exchange::exchange))
        .route("/exchange/quote", get(exchange::quote))
        .route("/exchange/buy-native", post(exchange::buy_native))
        .route("/exchange/sell-native", post(exchange::sell_native))
        .route("/exchange/buy-custom", post(exchange::buy_custom))
        .route("/exchange/sell-custom", post(exchange::sell_custom));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
