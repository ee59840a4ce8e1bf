// src/main.rs
mod accounts;
mod api;
mod auth;
mod error;
mod ledger;
mod market;
mod models;

use std::sync::Arc;

use env_logger::Builder;
use log::{info, LevelFilter};
use warp::Filter;

use crate::api::AppState;

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Debug)
        .format_timestamp_secs()
        .init();

    info!("Starting the paper trader application...");
    let state = Arc::new(AppState::new());
    info!(
        "Loaded {} demo accounts, portfolios start empty",
        state.accounts.read().await.len()
    );

    // The browser frontend runs on its own dev server.
    let cors = warp::cors()
        .allow_origin("http://localhost:3000")
        .allow_credentials(true)
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"]);

    let api = api::routes(state)
        .recover(error::handle_rejection)
        .with(cors);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3030);

    // Start the server
    info!("Server running on http://127.0.0.1:{}", port);
    warp::serve(api).run(([127, 0, 0, 1], port)).await;
}
