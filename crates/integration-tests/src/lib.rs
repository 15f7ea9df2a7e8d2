//! Integration test support for the Kiln storefront.
//!
//! [`MockBackend`] serves the shop backend, the postal lookup service and the
//! carrier quote endpoint from one in-process axum server bound to an
//! ephemeral port. Tests point a [`Storefront`] at it with
//! [`MockBackend::storefront`] and inspect [`MockBackend::calls`] afterwards.
//!
//! # Fixtures
//!
//! - Customer `ana@loja.com` / `segredo123`, token `token-ana`
//! - Addresses 1 (`80010000`), 2 (`20040002`) and 3 (`01001000`); address 1
//!   is used by an existing order
//! - Products 1..=5 in categories 1 (`Vasos`) and 2 (`Pratos`)
//! - Carrier: PAC costs the first destination digit times ten, SEDEX twice
//!   that; codes starting with `0` get only error entries

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kiln_storefront::Storefront;
use kiln_storefront::config::StorefrontConfig;
use kiln_storefront::storage::{KeyValueStorage, MemoryStorage};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// Email of the fixture customer.
pub const CUSTOMER_EMAIL: &str = "ana@loja.com";
/// Password of the fixture customer.
pub const CUSTOMER_PASSWORD: &str = "segredo123";
/// Token issued on login.
pub const CUSTOMER_TOKEN: &str = "token-ana";

/// One request received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
}

/// Mutable backend state shared by the handlers.
#[derive(Default)]
pub struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    addresses: Mutex<Vec<Value>>,
    referenced: Mutex<HashSet<i64>>,
    orders: Mutex<Vec<Value>>,
    users: Mutex<Vec<Value>>,
    products: Vec<Value>,
    categories: Vec<Value>,
    quote_delays: Mutex<HashMap<String, u64>>,
    shipments: Mutex<Vec<Value>>,
    next_id: AtomicI64,
    fail_orders: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    fn seeded() -> Self {
        let addresses = vec![
            address_json(1, "Rua XV de Novembro", "Curitiba", "PR", "80010000"),
            address_json(2, "Rua do Ouvidor", "Rio de Janeiro", "RJ", "20040002"),
            address_json(3, "Praça da Sé", "São Paulo", "SP", "01001000"),
        ];
        let categories = vec![
            json!({"id": 1, "name": "Vasos"}),
            json!({"id": 2, "name": "Pratos"}),
        ];
        let products = (1..=5)
            .map(|id: i32| {
                let category = if id <= 3 {
                    json!({"id": 1, "name": "Vasos"})
                } else {
                    json!({"id": 2, "name": "Pratos"})
                };
                json!({
                    "id": id,
                    "title": format!("Peça {id}"),
                    "text": "Feito à mão",
                    "img": format!("/img/{id}.jpg"),
                    "price": f64::from(10 * id) + 9.9,
                    "installment": "3x sem juros",
                    "color": "terracota",
                    "height": "20cm",
                    "width": "12cm",
                    "recommended_environment": "interno",
                    "recommended_for_plants": "suculentas",
                    "img1": "",
                    "img2": "",
                    "img3": "",
                    "category": category,
                })
            })
            .collect();

        Self {
            addresses: Mutex::new(addresses),
            referenced: Mutex::new(HashSet::from([1])),
            orders: Mutex::new(vec![json!({
                "id": 100,
                "date": "2025-01-15",
                "shipping": 20.0,
                "status": "DELIVERED",
                "payment": "paypal",
                "items": [{"id": 1, "productName": "Peça 1", "price": 19.9, "quantity": 1}]
            })]),
            users: Mutex::new(vec![json!({
                "id": 1,
                "displayName": "Ana Souza",
                "email": CUSTOMER_EMAIL,
                "ssn": "12345678900",
                "birthDate": "1990-05-01",
                "gender": "Female",
                "phone": "46999990000"
            })]),
            products,
            categories,
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn address_json(id: i64, street: &str, city: &str, state: &str, zip: &str) -> Value {
    json!({
        "id": id,
        "street": street,
        "number": 100,
        "complement": "",
        "neighborhood": "Centro",
        "city": city,
        "state": state,
        "country": "Brasil",
        "zip": zip,
    })
}

/// Running mock server.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Start a server with the default fixtures.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::seeded());
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// Base URL of the shop backend.
    ///
    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("valid mock URL")
    }

    /// Storefront configuration pointing every service at this mock.
    ///
    /// # Panics
    ///
    /// Panics if the generated configuration is rejected.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let base = format!("http://{}", self.addr);
        let values: HashMap<&str, String> = [
            ("KILN_API_URL", base.clone()),
            ("KILN_HTTP_TIMEOUT_SECS", "5".to_string()),
            ("POSTAL_LOOKUP_URL", format!("{base}/viacep")),
            ("CARRIER_API_URL", format!("{base}/carrier")),
        ]
        .into_iter()
        .collect();
        StorefrontConfig::from_source(|key| values.get(key).cloned()).expect("mock config")
    }

    /// A storefront on fresh in-memory storage.
    #[must_use]
    pub fn storefront(&self) -> Storefront {
        self.storefront_with(Arc::new(MemoryStorage::new()))
    }

    /// A storefront on the given storage.
    ///
    /// # Panics
    ///
    /// Panics if the storefront cannot be built.
    #[must_use]
    pub fn storefront_with(&self, storage: Arc<dyn KeyValueStorage>) -> Storefront {
        Storefront::with_storage(self.config(), storage).expect("storefront")
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state.calls).clone()
    }

    /// Number of requests to `path` with `method`.
    #[must_use]
    pub fn count(&self, method: &str, path: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    /// Forget recorded requests.
    pub fn reset_calls(&self) {
        lock(&self.state.calls).clear();
    }

    /// Order bodies received on `POST /order`.
    #[must_use]
    pub fn submitted_orders(&self) -> Vec<Value> {
        lock(&self.state.orders)
            .iter()
            .filter_map(|order| order.get("request").cloned())
            .collect()
    }

    /// Bodies received on the carrier quote endpoint.
    #[must_use]
    pub fn shipments(&self) -> Vec<Value> {
        lock(&self.state.shipments).clone()
    }

    /// Make the next order submissions fail with 500.
    pub fn fail_orders(&self, fail: bool) {
        self.state.fail_orders.store(fail, Ordering::SeqCst);
    }

    /// Delay carrier answers for one destination.
    pub fn delay_quotes(&self, postal_code: &str, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        lock(&self.state.quote_delays).insert(postal_code.to_string(), millis);
    }

    /// Ids of the addresses currently stored.
    #[must_use]
    pub fn address_ids(&self) -> Vec<i64> {
        lock(&self.state.addresses)
            .iter()
            .filter_map(|a| a["id"].as_i64())
            .collect()
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(find_user).put(update_user).delete(delete_user),
        )
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/{id}",
            get(find_address).put(update_address).delete(delete_address),
        )
        .route("/order", get(list_orders).post(create_order))
        .route("/order/{id}", get(find_order).delete(delete_order))
        .route("/products", get(list_products))
        .route("/products/page", get(products_page))
        .route("/products/category/{id}", get(products_by_category))
        .route("/products/{id}", get(find_product))
        .route("/categories", get(list_categories))
        .route("/viacep/{zip}/json/", get(postal_lookup))
        .route("/carrier/me/shipment/calculate", post(calculate_shipment))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Arc<MockState>>, request: Request, next: Next) -> Response {
    lock(&state.calls).push(RecordedCall {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
    });
    next.run(request).await
}

// =============================================================================
// Helper Functions
// =============================================================================

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {CUSTOMER_TOKEN}");
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Unauthorized"})),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("{what} not found")})),
    )
        .into_response()
}

fn validation_error(fields: &[(&str, &str)]) -> Response {
    let errors: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(field, message)| ((*field).to_string(), json!(message)))
        .collect();
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "message": "Validation error",
            "status": 400,
            "validationErrors": errors,
        })),
    )
        .into_response()
}

fn blank(value: &Value, field: &str) -> bool {
    value[field].as_str().is_none_or(|s| s.trim().is_empty())
}

// =============================================================================
// Users and login
// =============================================================================

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let known = lock(&state.users)
        .iter()
        .any(|user| user["email"] == body["email"]);
    if known && body["email"] == CUSTOMER_EMAIL && body["password"] == CUSTOMER_PASSWORD {
        Json(json!({"token": CUSTOMER_TOKEN})).into_response()
    } else {
        unauthorized()
    }
}

async fn list_users(State(state): State<Arc<MockState>>) -> Response {
    Json(Value::Array(lock(&state.users).clone())).into_response()
}

async fn create_user(State(state): State<Arc<MockState>>, Json(mut body): Json<Value>) -> Response {
    let mut users = lock(&state.users);
    if users.iter().any(|user| user["email"] == body["email"]) {
        return validation_error(&[("email", "already registered")]);
    }
    if blank(&body, "displayName") {
        return validation_error(&[("displayName", "must not be blank")]);
    }
    body["id"] = json!(state.next_id());
    if let Some(object) = body.as_object_mut() {
        object.remove("password");
    }
    users.push(body);
    StatusCode::CREATED.into_response()
}

async fn find_user(State(state): State<Arc<MockState>>, Path(id): Path<i64>) -> Response {
    lock(&state.users)
        .iter()
        .find(|user| user["id"] == id)
        .map_or_else(|| not_found("User"), |user| Json(user.clone()).into_response())
}

async fn update_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut users = lock(&state.users);
    let Some(user) = users.iter_mut().find(|user| user["id"] == id) else {
        return not_found("User");
    };
    body["id"] = json!(id);
    *user = body;
    StatusCode::OK.into_response()
}

async fn delete_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    lock(&state.users).retain(|user| user["id"] != id);
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Addresses
// =============================================================================

fn address_errors(body: &Value) -> Vec<(&'static str, &'static str)> {
    let mut errors = Vec::new();
    let zip_ok = body["zip"]
        .as_str()
        .is_some_and(|zip| zip.len() == 8 && zip.chars().all(|c| c.is_ascii_digit()));
    if !zip_ok {
        errors.push(("zip", "must be 8 digits"));
    }
    for field in ["street", "city", "state", "country"] {
        if blank(body, field) {
            errors.push((field, "must not be blank"));
        }
    }
    errors
}

async fn list_addresses(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(Value::Array(lock(&state.addresses).clone())).into_response()
}

async fn find_address(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    lock(&state.addresses)
        .iter()
        .find(|a| a["id"] == id)
        .map_or_else(|| not_found("Address"), |a| Json(a.clone()).into_response())
}

async fn create_address(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let errors = address_errors(&body);
    if !errors.is_empty() {
        return validation_error(&errors);
    }
    body["id"] = json!(state.next_id());
    lock(&state.addresses).push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_address(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let errors = address_errors(&body);
    if !errors.is_empty() {
        return validation_error(&errors);
    }
    let mut addresses = lock(&state.addresses);
    let Some(address) = addresses.iter_mut().find(|a| a["id"] == id) else {
        return not_found("Address");
    };
    body["id"] = json!(id);
    *address = body;
    StatusCode::OK.into_response()
}

async fn delete_address(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if lock(&state.referenced).contains(&id) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "Address is referenced by an order"})),
        )
            .into_response();
    }
    let mut addresses = lock(&state.addresses);
    let before = addresses.len();
    addresses.retain(|a| a["id"] != id);
    if addresses.len() == before {
        return not_found("Address");
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let orders: Vec<Value> = lock(&state.orders)
        .iter()
        .map(|order| {
            let mut order = order.clone();
            if let Some(object) = order.as_object_mut() {
                object.remove("request");
            }
            order
        })
        .collect();
    Json(Value::Array(orders)).into_response()
}

async fn find_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    lock(&state.orders)
        .iter()
        .find(|order| order["id"] == id)
        .map_or_else(
            || not_found("Order"),
            |order| {
                let mut order = order.clone();
                if let Some(object) = order.as_object_mut() {
                    object.remove("request");
                }
                Json(order).into_response()
            },
        )
}

async fn create_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if state.fail_orders.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "Order service unavailable"})),
        )
            .into_response();
    }

    let Some(address_id) = body["address"]["id"].as_i64() else {
        return validation_error(&[("address", "must not be null")]);
    };
    let items: Vec<Value> = body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let product_id = item["product"]["id"].as_i64().unwrap_or_default();
                    let product = state.products.iter().find(|p| p["id"] == product_id);
                    json!({
                        "id": state.next_id(),
                        "productName": product.map_or(json!(""), |p| p["title"].clone()),
                        "price": product.map_or(json!(0), |p| p["price"].clone()),
                        "quantity": item["quantity"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    if items.is_empty() {
        return validation_error(&[("items", "must not be empty")]);
    }

    let order = json!({
        "id": state.next_id(),
        "date": "2025-06-01",
        "shipping": body["shipping"],
        "status": "PENDING",
        "payment": body["payment"],
        "items": items,
    });
    let mut stored = order.clone();
    stored["request"] = body;
    lock(&state.orders).push(stored);
    lock(&state.referenced).insert(address_id);

    (StatusCode::CREATED, Json(order)).into_response()
}

async fn delete_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    lock(&state.orders).retain(|order| order["id"] != id);
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Deserialize)]
struct PageParams {
    page: usize,
    size: usize,
}

async fn list_products(State(state): State<Arc<MockState>>) -> Response {
    Json(state.products.clone()).into_response()
}

async fn products_page(
    State(state): State<Arc<MockState>>,
    Query(params): Query<PageParams>,
) -> Response {
    let size = params.size.max(1);
    let content: Vec<Value> = state
        .products
        .iter()
        .skip(params.page * size)
        .take(size)
        .cloned()
        .collect();
    let total = state.products.len();
    Json(json!({
        "content": content,
        "totalPages": total.div_ceil(size),
        "totalElements": total,
        "number": params.page,
        "size": size,
    }))
    .into_response()
}

async fn find_product(State(state): State<Arc<MockState>>, Path(id): Path<i64>) -> Response {
    state
        .products
        .iter()
        .find(|p| p["id"] == id)
        .map_or_else(|| not_found("Product"), |p| Json(p.clone()).into_response())
}

async fn products_by_category(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> Response {
    let products: Vec<Value> = state
        .products
        .iter()
        .filter(|p| p["category"]["id"] == id)
        .cloned()
        .collect();
    Json(products).into_response()
}

async fn list_categories(State(state): State<Arc<MockState>>) -> Response {
    Json(state.categories.clone()).into_response()
}

// =============================================================================
// External services
// =============================================================================

async fn postal_lookup(Path(zip): Path<String>) -> Response {
    match zip.as_str() {
        "85501560" => Json(json!({
            "cep": "85501-560",
            "logradouro": "Rua Tocantins",
            "complemento": "",
            "bairro": "Centro",
            "localidade": "Pato Branco",
            "uf": "PR",
        }))
        .into_response(),
        "99999999" => (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
        _ => Json(json!({"erro": true})).into_response(),
    }
}

async fn calculate_shipment(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Response {
    let destination = body["to"]["postal_code"].as_str().unwrap_or_default().to_string();
    lock(&state.shipments).push(body);

    let delay = lock(&state.quote_delays).get(&destination).copied();
    if let Some(millis) = delay {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    let first = destination
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0);
    if first == 0 {
        return Json(json!([
            {"id": 1, "name": "PAC", "error": "Serviço indisponível para o trecho."},
            {"id": 2, "name": "SEDEX", "error": "Serviço indisponível para o trecho."},
        ]))
        .into_response();
    }

    let pac = first * 10;
    Json(json!([
        {"id": 1, "name": "PAC", "price": format!("{pac}.00"), "delivery_time": 8,
         "company": {"id": 1, "name": "Correios"}},
        {"id": 2, "name": "SEDEX", "price": format!("{}.00", pac * 2), "delivery_time": 3,
         "company": {"id": 1, "name": "Correios"}},
        {"id": 18, "name": "Mini Envios", "error": "Dimensões excedem o limite."},
    ]))
    .into_response()
}
