use std::sync::Arc;

use pansoft_api::app::{build_app, services::AppServices};
use pansoft_inventory::StockPolicy;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, backed by the in-memory store on an ephemeral port.
        let services = Arc::new(AppServices::in_memory(StockPolicy::default()));
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_product(
    client: &reqwest::Client,
    server: &TestServer,
    sku: &str,
    quantity: i64,
) -> Value {
    let res = client
        .post(server.url("/api/products"))
        .json(&json!({
            "sku": sku,
            "name": format!("Pan {sku}"),
            "price": 2.5,
            "quantity": quantity,
            "minStock": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn product_stock_flows_through_the_ledger() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create_product(&client, &server, "BAG-01", 10).await;
    let id = created["product"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["product"]["quantity"].as_f64(), Some(10.0));
    assert_eq!(created["movement"]["movement_type"], "entrada");

    let res = client
        .put(server.url(&format!("/api/inventory/{id}")))
        .json(&json!({
            "quantity": 4,
            "movementType": "salida",
            "reason": "venta mostrador",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["product"]["quantity"].as_f64(), Some(6.0));
    assert_eq!(body["movement"]["quantity_change"].as_f64(), Some(-4.0));
    assert_eq!(body["movement"]["previous_quantity"].as_f64(), Some(10.0));
    assert_eq!(body["movement"]["new_quantity"].as_f64(), Some(6.0));

    let res = client
        .get(server.url("/api/inventory/history/all/movements?limit=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let history: Value = res.json().await.unwrap();
    assert_eq!(history["total"], 2);
    let items = history["data"].as_array().unwrap();
    // Newest first.
    assert_eq!(items[0]["movement_type"], "salida");
    assert_eq!(items[0]["sku"], "BAG-01");
    assert_eq!(items[0]["product_name"], "Pan BAG-01");
    assert_eq!(items[0]["reason"], "venta mostrador");
    assert_eq!(items[1]["movement_type"], "entrada");

    let res = client
        .get(server.url(&format!("/api/inventory/{id}/movements?movementType=entrada")))
        .send()
        .await
        .unwrap();
    let filtered: Value = res.json().await.unwrap();
    assert_eq!(filtered["total"], 1);
}

#[tokio::test]
async fn insufficient_stock_is_rejected_without_side_effects() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create_product(&client, &server, "CRO-01", 3).await;
    let id = created["product"]["id"].as_str().unwrap().to_string();

    let res = client
        .put(server.url(&format!("/api/inventory/{id}")))
        .json(&json!({ "quantity": 5, "movementType": "salida" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let product: Value = client
        .get(server.url(&format!("/api/inventory/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(product["quantity"].as_f64(), Some(3.0));
}

#[tokio::test]
async fn delivering_a_sales_order_consumes_stock() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create_product(&client, &server, "TAR-01", 20).await;
    let product_id = created["product"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(server.url("/api/sales-orders"))
        .json(&json!({
            "customerName": "Cafetería Sol",
            "lines": [{ "productId": product_id, "quantity": 8, "unitPrice": 3 }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["status"], "pendiente");
    assert_eq!(order["total"].as_f64(), Some(24.0));
    let order_id = order["id"].as_str().unwrap().to_string();

    let res = client
        .patch(server.url(&format!("/api/sales-orders/{order_id}/status")))
        .json(&json!({ "status": "en_proceso" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["inventoryUpdated"], false);

    let res = client
        .patch(server.url(&format!("/api/sales-orders/{order_id}/status")))
        .json(&json!({ "status": "entregado" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["inventoryUpdated"], true);
    assert_eq!(body["order"]["status"], "entregado");
    assert_eq!(body["movements"][0]["reference_type"], "sales_order");

    let product: Value = client
        .get(server.url(&format!("/api/products/{product_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(product["quantity"].as_f64(), Some(12.0));

    let res = client
        .patch(server.url(&format!("/api/sales-orders/{order_id}/status")))
        .json(&json!({ "status": "pendiente" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn supply_movements_have_their_own_history() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/api/supplies"))
        .json(&json!({ "name": "Harina de trigo", "unit": "kg", "quantity": 50 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["supply"]["id"].as_str().unwrap().to_string();

    let res = client
        .put(server.url(&format!("/api/supplies/{id}")))
        .json(&json!({ "quantity": 42, "movementType": "ajuste", "reason": "conteo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["supply"]["quantity"].as_f64(), Some(42.0));
    assert_eq!(body["movement"]["quantity_change"].as_f64(), Some(-8.0));

    let history: Value = client
        .get(server.url("/api/supplies/history/all/movements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["total"], 2);
    assert_eq!(history["data"][0]["supply_name"], "Harina de trigo");
    assert_eq!(history["data"][0]["unit"], "kg");
    assert!(history["data"][0].get("sku").is_none());

    // Product history does not include supply movements.
    let products: Value = client
        .get(server.url("/api/inventory/history/all/movements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(products["total"], 0);
}

#[tokio::test]
async fn error_statuses() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    create_product(&client, &server, "DUP-01", 0).await;
    let res = client
        .post(server.url("/api/products"))
        .json(&json!({ "sku": "DUP-01", "name": "Otro pan" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(server.url(&format!("/api/products/{}", uuid::Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/api/products/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(server.url("/api/products"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_body");

    let res = client
        .get(server.url("/api/sales-orders?status=perdido"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(server.url("/api/employees"))
        .json(&json!({ "fullName": "Ana Ruiz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ledger_audit_is_clean_after_normal_use() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    create_product(&client, &server, "AUD-01", 7).await;

    let body: Value = client
        .get(server.url("/api/admin/ledger/audit?kind=product"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["kind"], "product");
    assert_eq!(body["subjects"], json!([]));

    let res = client
        .post(server.url("/api/admin/ledger/repair?kind=supply"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["repairs"], json!([]));

    let res = client
        .get(server.url("/api/admin/ledger/audit?kind=recipes"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_order_amounts_are_a_bad_request() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let created = create_product(&client, &server, "BIG-01", 1).await;
    let product_id = created["product"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(server.url("/api/sales-orders"))
        .header("content-type", "application/json")
        .body(format!(
            concat!(
                r#"{{"customerName":"Hotel Plaza","lines":[{{"productId":"{}","#,
                r#""quantity":1e20,"unitPrice":1e20}}]}}"#,
            ),
            product_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_movements_report_their_own_result() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let created = create_product(&client, &server, "PAR-01", 10).await;
    let id = created["product"]["id"].as_str().unwrap().to_string();

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let url = server.url(&format!("/api/inventory/{id}"));
            tokio::spawn(async move {
                let res = client
                    .put(url)
                    .json(&json!({ "quantity": 1, "movementType": "entrada" }))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(res.status(), StatusCode::OK);
                res.json::<Value>().await.unwrap()
            })
        })
        .collect();
    let mut bodies = Vec::new();
    for request in requests {
        bodies.push(request.await.unwrap());
    }

    let mut seen: Vec<f64> = bodies
        .iter()
        .map(|body| {
            let quantity = body["product"]["quantity"].as_f64().unwrap();
            assert_eq!(Some(quantity), body["movement"]["new_quantity"].as_f64());
            quantity
        })
        .collect();
    seen.sort_by(f64::total_cmp);
    assert_eq!(seen, (11..=18).map(f64::from).collect::<Vec<_>>());
}
