// src/api.rs
use std::sync::Arc;

use log::{error, info};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use warp::{Filter, Rejection, Reply};

use crate::accounts;
use crate::auth;
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::market;
use crate::models::{LoginRequest, TradeRequest, User, UserProfile};

/// Shared, process-lifetime application state: the demo accounts (balances
/// mutate on trades) and the portfolio ledger. Both sit behind locks so
/// concurrent trade requests cannot interleave their read-check-write steps;
/// everything here is lost on restart.
pub struct AppState {
    pub accounts: RwLock<Vec<User>>,
    pub ledger: RwLock<Ledger>,
    pub client: Client,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            accounts: RwLock::new(accounts::demo_accounts()),
            ledger: RwLock::new(Ledger::new()),
            client: Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct ChartQuery {
    range: Option<String>,
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let login = warp::path!("api" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(login_handler);

    let logout = warp::path!("api" / "logout")
        .and(warp::post())
        .and_then(logout_handler);

    let user = warp::path!("api" / "user")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(user_handler);

    let stocks = warp::path!("api" / "stocks")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(stocks_handler);

    let stock_detail = warp::path!("api" / "stocks" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(stock_detail_handler);

    let chart = warp::path!("api" / "stocks" / String / "chart")
        .and(warp::get())
        .and(warp::query::<ChartQuery>())
        .and(with_state(state.clone()))
        .and_then(chart_handler);

    let portfolio = warp::path!("api" / "portfolio")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(portfolio_handler);

    let trade = warp::path!("api" / "trade")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(trade_handler);

    login
        .or(logout)
        .or(user)
        .or(stocks)
        .or(stock_detail)
        .or(chart)
        .or(portfolio)
        .or(trade)
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the session cookie to a known user id, or rejects with 401.
fn authenticated(
    state: Arc<AppState>,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>("session")
        .and(with_state(state))
        .and_then(authorize)
}

async fn authorize(cookie: Option<String>, state: Arc<AppState>) -> Result<String, Rejection> {
    let token = cookie.ok_or_else(|| unauthorized("Not authenticated"))?;
    let user_id = auth::verify_token(&token).ok_or_else(|| unauthorized("Invalid session"))?;
    let accounts = state.accounts.read().await;
    if accounts::find_by_id(&accounts, &user_id).is_none() {
        return Err(unauthorized("Invalid session"));
    }
    Ok(user_id)
}

fn unauthorized(message: &str) -> Rejection {
    warp::reject::custom(ApiError::Unauthorized(message.to_string()))
}

fn bad_request(message: &str) -> Rejection {
    warp::reject::custom(ApiError::BadRequest(message.to_string()))
}

async fn login_handler(
    request: LoginRequest,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(bad_request("Email and password are required"));
    }

    let accounts = state.accounts.read().await;
    let user = accounts::find_by_email(&accounts, &request.email)
        .filter(|user| user.password == request.password)
        .ok_or_else(|| unauthorized("Invalid email or password"))?;

    let max_age = auth::session_max_age(request.keep_logged_in);
    let token = auth::create_token(&user.id, max_age);
    info!("User {} logged in", user.id);

    let body = warp::reply::json(&json!({
        "success": true,
        "user": UserProfile::from(user),
    }));
    Ok(warp::reply::with_header(
        body,
        "set-cookie",
        format!(
            "session={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            token, max_age
        ),
    ))
}

async fn logout_handler() -> Result<impl Reply, Rejection> {
    let body = warp::reply::json(&json!({
        "success": true,
        "message": "Logged out successfully",
    }));
    Ok(warp::reply::with_header(
        body,
        "set-cookie",
        "session=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax",
    ))
}

async fn user_handler(user_id: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let accounts = state.accounts.read().await;
    let user =
        accounts::find_by_id(&accounts, &user_id).ok_or_else(|| unauthorized("Invalid session"))?;
    Ok(warp::reply::json(&json!({ "user": UserProfile::from(user) })))
}

async fn stocks_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    // Sampled before the await: thread_rng must not be held across it.
    let symbols: Vec<&str> = {
        let mut rng = rand::thread_rng();
        market::STOCK_SYMBOLS
            .choose_multiple(&mut rng, 10)
            .copied()
            .collect()
    };

    let stocks = match market::fetch_quotes(&state.client, &symbols).await {
        Ok(quotes) if !quotes.is_empty() => quotes,
        Ok(_) => {
            info!("Quote fetch returned no data, serving mock quotes");
            market::mock_quotes(&symbols)
        }
        Err(e) => {
            error!("Error fetching stock data: {}", e);
            market::mock_quotes(&symbols)
        }
    };

    Ok(warp::reply::json(&json!({ "stocks": stocks })))
}

async fn stock_detail_handler(
    symbol: String,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let symbol = symbol.to_uppercase();
    let stock = match market::fetch_detail(&state.client, &symbol).await {
        Ok(Some(detail)) => detail,
        Ok(None) => {
            info!("No provider data for {}, serving mock detail", symbol);
            market::mock_detail(&symbol)
        }
        Err(e) => {
            error!("Error fetching stock detail for {}: {}", symbol, e);
            market::mock_detail(&symbol)
        }
    };
    Ok(warp::reply::json(&json!({ "stock": stock })))
}

async fn chart_handler(
    symbol: String,
    query: ChartQuery,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let symbol = symbol.to_uppercase();
    let range = query.range.unwrap_or_else(|| "1mo".to_string());

    let mut data = match market::fetch_history(&state.client, &symbol, &range).await {
        Ok(points) => points,
        Err(e) => {
            error!("Error fetching historical data for {}: {}", symbol, e);
            Vec::new()
        }
    };
    if data.is_empty() {
        data = market::mock_history(market::range_to_days(&range));
    }

    Ok(warp::reply::json(&json!({ "data": data })))
}

async fn portfolio_handler(user_id: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ledger = state.ledger.read().await;
    Ok(warp::reply::json(&json!({
        "portfolio": ledger.portfolio(&user_id),
    })))
}

/// The ledger's caller: owns request validation and the balance side of a
/// trade, then hands the bookkeeping to [`Ledger`]. Both locks are held for
/// the whole check-debit-record sequence so trades serialize.
async fn trade_handler(
    user_id: String,
    request: TradeRequest,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let symbol = request.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(bad_request("Missing required fields"));
    }
    if request.action != "buy" && request.action != "sell" {
        return Err(bad_request("Invalid action. Must be \"buy\" or \"sell\""));
    }
    if request.quantity == 0 {
        return Err(bad_request("Invalid quantity"));
    }
    if !request.price.is_finite() || request.price <= 0.0 {
        return Err(bad_request("Invalid price"));
    }

    let total = request.price * f64::from(request.quantity);

    let mut accounts = state.accounts.write().await;
    let mut ledger = state.ledger.write().await;
    let user = accounts::find_by_id_mut(&mut accounts, &user_id)
        .ok_or_else(|| unauthorized("Invalid session"))?;

    if request.action == "buy" {
        if user.balance < total {
            return Err(bad_request("Insufficient funds"));
        }
        user.balance -= total;
        ledger.buy(&user_id, &symbol, request.quantity, request.price);
        info!(
            "User {} bought {} {} at {}",
            user_id, request.quantity, symbol, request.price
        );
    } else {
        if ledger.sell(&user_id, &symbol, request.quantity).is_err() {
            return Err(bad_request("Insufficient shares"));
        }
        user.balance += total;
        info!(
            "User {} sold {} {} at {}",
            user_id, request.quantity, symbol, request.price
        );
    }

    Ok(warp::reply::json(&json!({
        "success": true,
        "user": UserProfile::from(&*user),
        "portfolio": ledger.portfolio(&user_id),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::handle_rejection;
    use serde_json::Value;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new())
    }

    fn api(
        state: Arc<AppState>,
    ) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        routes(state).recover(handle_rejection)
    }

    fn session_cookie(user_id: &str) -> String {
        format!("session={}", auth::create_token(user_id, 3600))
    }

    fn trade_request(cookie: &str, body: &Value) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path("/api/trade")
            .header("cookie", cookie)
            .json(body)
    }

    #[tokio::test]
    async fn login_sets_session_cookie_and_hides_password() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/login")
            .json(&json!({"email": "demo@robinhood.com", "password": "demo123"}))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 200);
        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["user"]["id"], "user1");
        assert_eq!(body["user"]["firstName"], "John");
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn keep_logged_in_extends_the_cookie() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/login")
            .json(&json!({
                "email": "demo@robinhood.com",
                "password": "demo123",
                "keepLoggedIn": true,
            }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 200);
        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.contains("Max-Age=2592000"));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/login")
            .json(&json!({"email": "demo@robinhood.com", "password": "wrong"}))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 401);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn login_with_missing_fields_is_a_bad_request() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/login")
            .json(&json!({"email": "demo@robinhood.com"}))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/logout")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 200);
        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn user_endpoint_requires_a_session() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("GET")
            .path("/api/user")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 401);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Not authenticated");
    }

    #[tokio::test]
    async fn user_endpoint_rejects_a_garbage_token() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("GET")
            .path("/api/user")
            .header("cookie", "session=garbage")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 401);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Invalid session");
    }

    #[tokio::test]
    async fn user_endpoint_returns_the_profile() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("GET")
            .path("/api/user")
            .header("cookie", session_cookie("user2"))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"]["email"], "test@example.com");
        assert_eq!(body["user"]["balance"], json!(8743.20));
    }

    #[tokio::test]
    async fn portfolio_starts_empty() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("GET")
            .path("/api/portfolio")
            .header("cookie", session_cookie("user1"))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["portfolio"], json!([]));
    }

    #[tokio::test]
    async fn buy_then_sell_all_round_trips_balance_and_portfolio() {
        let filter = api(test_state());
        let cookie = session_cookie("user1");

        // Buy 10 AAPL @ 100: balance 12500.75 -> 11500.75.
        let request = json!({"symbol": "AAPL", "action": "buy", "quantity": 10, "price": 100.0});
        let response = trade_request(&cookie, &request).reply(&filter).await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["user"]["balance"], json!(11500.75));
        assert_eq!(body["portfolio"][0]["symbol"], "AAPL");
        assert_eq!(body["portfolio"][0]["shares"], json!(10));
        assert_eq!(body["portfolio"][0]["averageCost"], json!(100.0));

        // Buy 5 more @ 130: weighted average lands on 110.
        let request = json!({"symbol": "AAPL", "action": "buy", "quantity": 5, "price": 130.0});
        let response = trade_request(&cookie, &request).reply(&filter).await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"]["balance"], json!(10850.75));
        assert_eq!(body["portfolio"][0]["shares"], json!(15));
        assert_eq!(body["portfolio"][0]["averageCost"], json!(110.0));

        // Sell all 15 @ 110: holding gone, balance restored.
        let request = json!({"symbol": "AAPL", "action": "sell", "quantity": 15, "price": 110.0});
        let response = trade_request(&cookie, &request).reply(&filter).await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"]["balance"], json!(12500.75));
        assert_eq!(body["portfolio"], json!([]));
    }

    #[tokio::test]
    async fn selling_without_shares_is_rejected_without_mutation() {
        let filter = api(test_state());
        let cookie = session_cookie("user1");

        let request = json!({"symbol": "TSLA", "action": "sell", "quantity": 1, "price": 250.0});
        let response = trade_request(&cookie, &request).reply(&filter).await;
        assert_eq!(response.status(), 400);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Insufficient shares");

        // Balance untouched by the failed sell.
        let response = warp::test::request()
            .method("GET")
            .path("/api/user")
            .header("cookie", &cookie)
            .reply(&filter)
            .await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"]["balance"], json!(12500.75));
    }

    #[tokio::test]
    async fn buying_beyond_the_balance_is_rejected() {
        let filter = api(test_state());
        let request = json!({"symbol": "NVDA", "action": "buy", "quantity": 100, "price": 900.0});
        let response = trade_request(&session_cookie("user2"), &request)
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 400);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Insufficient funds");
    }

    #[tokio::test]
    async fn trade_validates_action_quantity_and_price() {
        let filter = api(test_state());
        let cookie = session_cookie("user1");

        let cases = [
            (
                json!({"symbol": "AAPL", "action": "hold", "quantity": 1, "price": 10.0}),
                "Invalid action. Must be \"buy\" or \"sell\"",
            ),
            (
                json!({"symbol": "AAPL", "action": "buy", "quantity": 0, "price": 10.0}),
                "Invalid quantity",
            ),
            (
                json!({"symbol": "AAPL", "action": "buy", "quantity": 1, "price": -10.0}),
                "Invalid price",
            ),
            (
                json!({"symbol": "  ", "action": "buy", "quantity": 1, "price": 10.0}),
                "Missing required fields",
            ),
        ];

        for (request, message) in cases {
            let response = trade_request(&cookie, &request).reply(&filter).await;
            assert_eq!(response.status(), 400);
            let body: Value = serde_json::from_slice(response.body()).unwrap();
            assert_eq!(body["message"], message);
        }
    }

    #[tokio::test]
    async fn trade_normalizes_symbol_case() {
        let filter = api(test_state());
        let request = json!({"symbol": "aapl", "action": "buy", "quantity": 2, "price": 100.0});
        let response = trade_request(&session_cookie("user3"), &request)
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["portfolio"][0]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn trade_requires_a_session() {
        let filter = api(test_state());
        let response = warp::test::request()
            .method("POST")
            .path("/api/trade")
            .json(&json!({"symbol": "AAPL", "action": "buy", "quantity": 1, "price": 10.0}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 401);
    }
}
