//! In-process stub of the storefront backend for integration tests.
//!
//! [`StubBackend`] serves the real wire contract over a loopback socket so
//! the client exercises its full pipeline, including bearer injection and
//! failure classification. Failure knobs force specific backend responses;
//! hold latches park a handler mid-request so tests can observe the client's
//! in-flight guards.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use url::Url;

use shopfront_client::{ClientConfig, CredentialStore, MemoryCredentialStore, Storefront};
use shopfront_core::{
    CartLine, Item, ItemId, Order, OrderId, OrderLine, OrderStatus, User, UserId,
};

static TRACING: Once = Once::new();

/// Install a test subscriber once per process. Filter via `SHOPFRONT_TEST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_env("SHOPFRONT_TEST_LOG"))
            .with_test_writer()
            .try_init();
    });
}

/// Build a catalog item priced in cents.
#[must_use]
pub fn sample_item(id: &str, name: &str, cents: i64) -> Item {
    Item {
        id: ItemId::from(id),
        name: name.to_string(),
        description: String::new(),
        price: Decimal::new(cents, 2),
        image: None,
        category: None,
        stock: Some(25),
    }
}

/// Poll a condition for up to one second.
///
/// # Panics
///
/// Panics if the condition never becomes true.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..200_u32 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

// ============================================================================
// Stub state
// ============================================================================

/// Shared state behind the stub's handlers.
///
/// All mutexes are held only for synchronous sections; latch waits happen
/// with no lock held.
#[derive(Default)]
pub struct StubState {
    items: Mutex<Vec<Item>>,
    cart: Mutex<Vec<CartLine>>,
    orders: Mutex<Vec<Order>>,
    session_token: Mutex<Option<String>>,
    session_user: Mutex<Option<User>>,
    seq: AtomicUsize,

    /// Total requests served, across all endpoints.
    hits: AtomicUsize,

    // Failure knobs.
    token_mismatch: AtomicBool,
    already_logged_in: AtomicBool,
    fail_logout: AtomicBool,
    fail_cart_updates: AtomicBool,
    fail_orders: AtomicBool,

    // Hold latches.
    hold_cart_updates: AtomicBool,
    cart_updates_started: AtomicUsize,
    cart_updates_gate: Notify,
    hold_orders: AtomicBool,
    orders_started: AtomicUsize,
    orders_gate: Notify,
}

impl StubState {
    /// Add an item to the served catalog.
    pub fn seed_item(&self, item: Item) {
        self.items.lock().expect("items mutex poisoned").push(item);
    }

    /// Establish a server-side session directly, bypassing the login
    /// endpoint. Pair with a token written into the client's credential
    /// store to test startup re-hydration.
    pub fn authenticate(&self, token: &str, username: &str) -> User {
        let user = User {
            id: UserId::from(format!("u-{username}")),
            username: username.to_string(),
            email: None,
        };
        *self
            .session_token
            .lock()
            .expect("session token mutex poisoned") = Some(token.to_string());
        *self
            .session_user
            .lock()
            .expect("session user mutex poisoned") = Some(user.clone());
        user
    }

    /// Total requests served so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Snapshot of the server-side cart.
    #[must_use]
    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.cart.lock().expect("cart mutex poisoned").clone()
    }

    /// Snapshot of placed orders.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().expect("orders mutex poisoned").clone()
    }

    /// Reject every authorized request with 401 `TOKEN_MISMATCH`, as the
    /// backend does after a newer login elsewhere revokes the token.
    pub fn set_token_mismatch(&self, on: bool) {
        self.token_mismatch.store(on, Ordering::SeqCst);
    }

    /// Reject login with 403 `ALREADY_LOGGED_IN`.
    pub fn set_already_logged_in(&self, on: bool) {
        self.already_logged_in.store(on, Ordering::SeqCst);
    }

    /// Fail the logout endpoint with a 500.
    pub fn set_fail_logout(&self, on: bool) {
        self.fail_logout.store(on, Ordering::SeqCst);
    }

    /// Fail cart line updates and removals with a 500.
    pub fn set_fail_cart_updates(&self, on: bool) {
        self.fail_cart_updates.store(on, Ordering::SeqCst);
    }

    /// Fail order placement with a 500.
    pub fn set_fail_orders(&self, on: bool) {
        self.fail_orders.store(on, Ordering::SeqCst);
    }

    /// Park incoming cart updates until [`release_cart_update`] is called.
    ///
    /// [`release_cart_update`]: Self::release_cart_update
    pub fn set_hold_cart_updates(&self, on: bool) {
        self.hold_cart_updates.store(on, Ordering::SeqCst);
    }

    /// Number of cart updates that reached the hold latch.
    #[must_use]
    pub fn cart_updates_started(&self) -> usize {
        self.cart_updates_started.load(Ordering::SeqCst)
    }

    /// Let one parked cart update proceed.
    pub fn release_cart_update(&self) {
        self.cart_updates_gate.notify_one();
    }

    /// Park incoming order placements until [`release_order`] is called.
    ///
    /// [`release_order`]: Self::release_order
    pub fn set_hold_orders(&self, on: bool) {
        self.hold_orders.store(on, Ordering::SeqCst);
    }

    /// Number of order placements that reached the hold latch.
    #[must_use]
    pub fn orders_started(&self) -> usize {
        self.orders_started.load(Ordering::SeqCst)
    }

    /// Let one parked order placement proceed.
    pub fn release_order(&self) {
        self.orders_gate.notify_one();
    }

    fn next_seq(&self) -> usize {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn bump(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        if self.token_mismatch.load(Ordering::SeqCst) {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                Some("TOKEN_MISMATCH"),
                "Session superseded by a newer login",
            ));
        }

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let current = self
            .session_token
            .lock()
            .expect("session token mutex poisoned");

        match (bearer, current.as_deref()) {
            (Some(sent), Some(active)) if sent == active => Ok(()),
            _ => Err(error_response(
                StatusCode::UNAUTHORIZED,
                None,
                "Not authenticated",
            )),
        }
    }

    fn cart_payload(&self) -> Value {
        let lines = self.cart.lock().expect("cart mutex poisoned").clone();
        let total: Decimal = lines.iter().map(CartLine::line_total).sum();
        json!({ "cart": { "items": lines }, "total": total })
    }
}

fn error_response(status: StatusCode, code: Option<&str>, message: &str) -> Response {
    let mut body = json!({ "message": message });
    if let Some(code) = code {
        body["code"] = json!(code);
    }
    (status, Json(body)).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn register(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.bump();
    let username = body["username"].as_str().unwrap_or_default();
    if username.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, None, "Username is required");
    }

    let user = User {
        id: UserId::from(format!("u-{}", state.next_seq())),
        username: username.to_string(),
        email: body["email"].as_str().map(String::from),
    };
    (StatusCode::CREATED, Json(json!({ "user": user }))).into_response()
}

async fn login(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.bump();
    if state.already_logged_in.load(Ordering::SeqCst) {
        return error_response(
            StatusCode::FORBIDDEN,
            Some("ALREADY_LOGGED_IN"),
            "User is already logged in on another device",
        );
    }

    let username = body["username"].as_str().unwrap_or_default();
    if username.is_empty() || body["password"].as_str().unwrap_or_default().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, None, "Invalid credentials");
    }

    let token = format!("tok-{}", state.next_seq());
    let user = state.authenticate(&token, username);
    Json(json!({ "token": token, "user": user })).into_response()
}

async fn me(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    let user = state
        .session_user
        .lock()
        .expect("session user mutex poisoned")
        .clone();
    user.map_or_else(
        || error_response(StatusCode::UNAUTHORIZED, None, "Not authenticated"),
        |user| Json(json!({ "user": user })).into_response(),
    )
}

async fn logout(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    if state.fail_logout.load(Ordering::SeqCst) {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Logout failed",
        );
    }

    *state
        .session_token
        .lock()
        .expect("session token mutex poisoned") = None;
    *state
        .session_user
        .lock()
        .expect("session user mutex poisoned") = None;
    Json(json!({})).into_response()
}

async fn list_items(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    let items = state.items.lock().expect("items mutex poisoned").clone();
    Json(json!({ "items": items })).into_response()
}

async fn get_cart(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    Json(state.cart_payload()).into_response()
}

async fn add_line(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    let item_id = body["itemId"].as_str().unwrap_or_default();
    let quantity = body["quantity"]
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .unwrap_or(0);
    if quantity == 0 {
        return error_response(StatusCode::BAD_REQUEST, None, "Invalid quantity");
    }

    let item = state
        .items
        .lock()
        .expect("items mutex poisoned")
        .iter()
        .find(|item| item.id.as_str() == item_id)
        .cloned();
    let Some(item) = item else {
        return error_response(StatusCode::NOT_FOUND, None, "Item not found");
    };

    let mut cart = state.cart.lock().expect("cart mutex poisoned");
    if let Some(line) = cart.iter_mut().find(|line| line.item.id.as_str() == item_id) {
        line.quantity += quantity;
    } else {
        cart.push(CartLine { item, quantity });
    }
    drop(cart);

    (StatusCode::CREATED, Json(json!({}))).into_response()
}

async fn update_line(
    State(state): State<Arc<StubState>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    // Latch wait happens with no mutex held.
    if state.hold_cart_updates.load(Ordering::SeqCst) {
        state.cart_updates_started.fetch_add(1, Ordering::SeqCst);
        state.cart_updates_gate.notified().await;
    }
    if state.fail_cart_updates.load(Ordering::SeqCst) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "Update failed");
    }

    let quantity = body["quantity"]
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .unwrap_or(0);
    if quantity == 0 {
        return error_response(StatusCode::BAD_REQUEST, None, "Invalid quantity");
    }

    let mut cart = state.cart.lock().expect("cart mutex poisoned");
    let Some(line) = cart.iter_mut().find(|line| line.item.id.as_str() == item_id) else {
        return error_response(StatusCode::NOT_FOUND, None, "Item not in cart");
    };
    line.quantity = quantity;
    drop(cart);

    Json(json!({})).into_response()
}

async fn remove_line(
    State(state): State<Arc<StubState>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    if state.hold_cart_updates.load(Ordering::SeqCst) {
        state.cart_updates_started.fetch_add(1, Ordering::SeqCst);
        state.cart_updates_gate.notified().await;
    }
    if state.fail_cart_updates.load(Ordering::SeqCst) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "Remove failed");
    }

    state
        .cart
        .lock()
        .expect("cart mutex poisoned")
        .retain(|line| line.item.id.as_str() != item_id);
    Json(json!({})).into_response()
}

async fn create_order(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    if state.hold_orders.load(Ordering::SeqCst) {
        state.orders_started.fetch_add(1, Ordering::SeqCst);
        state.orders_gate.notified().await;
    }
    if state.fail_orders.load(Ordering::SeqCst) {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Order placement failed",
        );
    }

    let lines = std::mem::take(&mut *state.cart.lock().expect("cart mutex poisoned"));
    if lines.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, None, "Cart is empty");
    }

    let total: Decimal = lines.iter().map(CartLine::line_total).sum();
    let order = Order {
        id: OrderId::from(format!("ord-{}", state.next_seq())),
        status: OrderStatus::Pending,
        total_amount: total,
        created_at: Utc::now(),
        items: lines
            .into_iter()
            .map(|line| {
                let price = line.item.price;
                OrderLine {
                    item: line.item,
                    quantity: line.quantity,
                    price,
                }
            })
            .collect(),
    };
    state
        .orders
        .lock()
        .expect("orders mutex poisoned")
        .push(order);

    (StatusCode::CREATED, Json(json!({}))).into_response()
}

async fn list_orders(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.bump();
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    let orders = state.orders.lock().expect("orders mutex poisoned").clone();
    Json(json!({ "orders": orders })).into_response()
}

fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/api/items", get(list_items))
        .route("/api/carts", get(get_cart).post(add_line))
        .route("/api/carts/{item_id}", put(update_line).delete(remove_line))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/users", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/me", get(me))
        .route("/api/users/logout", post(logout))
        .with_state(state)
}

// ============================================================================
// Backend handle
// ============================================================================

/// A stub backend bound to an ephemeral loopback port.
pub struct StubBackend {
    /// Handlers' shared state: knobs, latches, and data snapshots.
    pub state: Arc<StubState>,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl StubBackend {
    /// Bind and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind, which fails the test.
    pub async fn start() -> Self {
        init_tracing();

        let state = Arc::new(StubState::default());
        let app = router(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub backend");
        });

        Self {
            state,
            addr,
            server,
        }
    }

    /// Base URL of the running stub, without the `/api` prefix.
    ///
    /// # Panics
    ///
    /// Panics if the bound address does not form a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("valid stub url")
    }

    /// Build a client against this stub with a fresh in-memory credential
    /// store. The store handle is returned so tests can seed and inspect the
    /// persisted token.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn storefront(&self) -> (Storefront, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let config = ClientConfig::new(self.base_url());
        let storefront = Storefront::new(&config, Arc::clone(&store) as Arc<dyn CredentialStore>)
            .expect("build storefront");
        (storefront, store)
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
