//! Test helper module for checkout-service integration tests.
//!
//! Spawns the application on a random port over the in-memory store, with a
//! wiremock server standing in for the payment gateway.

#![allow(dead_code)]

use checkout_service::config::{
    CheckoutConfig, CheckoutRules, DatabaseConfig, GatewayConfig, NotificationConfig,
};
use checkout_service::middleware::{USER_ID_HEADER, USER_ROLE_HEADER};
use checkout_service::services::gateway::CALLBACK_SIGNATURE_HEADER;
use checkout_service::services::{HttpPaymentGateway, LogNotifier, MemoryStore};
use checkout_service::startup::Application;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::utils::signature::sign_payload;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CALLBACK_SECRET: &str = "test-callback-secret";

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    pub gateway: MockServer,
    pub store: MemoryStore,
    pub admin_id: Uuid,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        let gateway = MockServer::start().await;

        let config = CheckoutConfig {
            server: CoreConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            service_name: "checkout-service-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
                min_connections: 1,
            },
            gateway: GatewayConfig {
                base_url: gateway.uri(),
                server_key: Secret::new("test-server-key".to_string()),
                callback_secret: Secret::new(CALLBACK_SECRET.to_string()),
                callback_url: "http://127.0.0.1/payment/callback".to_string(),
                timeout_secs: 5,
                max_retries: 0,
            },
            checkout: CheckoutRules {
                checkout_window_days: 7,
                payment_window_minutes: 24 * 60,
                sweep_interval_secs: 0,
            },
            notifications: NotificationConfig {
                webhook_url: None,
                max_retries: 0,
            },
        };

        let store = MemoryStore::new();
        let http_gateway = HttpPaymentGateway::new(config.gateway.clone())
            .expect("Failed to build gateway client");

        let app = Application::build_with(
            config,
            Arc::new(store.clone()),
            Arc::new(http_gateway),
            Arc::new(LogNotifier),
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            client,
            gateway,
            store,
            admin_id: Uuid::new_v4(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    // =========================================================================
    // Raw requests
    // =========================================================================

    pub async fn get_as(&self, user_id: Uuid, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header(USER_ID_HEADER, user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_as(&self, user_id: Uuid, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .header(USER_ID_HEADER, user_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .header(USER_ID_HEADER, self.admin_id.to_string())
            .header(USER_ROLE_HEADER, "admin")
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header(USER_ID_HEADER, self.admin_id.to_string())
            .header(USER_ROLE_HEADER, "admin")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_patch(&self, path: &str, body: &Value) -> Response {
        self.client
            .patch(self.url(path))
            .header(USER_ID_HEADER, self.admin_id.to_string())
            .header(USER_ROLE_HEADER, "admin")
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Post a callback signed with the configured secret.
    pub async fn callback(&self, body: &Value) -> Response {
        let raw = serde_json::to_vec(body).unwrap();
        let signature = sign_payload(CALLBACK_SECRET, &raw).unwrap();
        self.callback_raw(raw, Some(&signature)).await
    }

    pub async fn callback_raw(&self, raw: Vec<u8>, signature: Option<&str>) -> Response {
        let mut request = self
            .client
            .post(self.url("/payment/callback"))
            .header("content-type", "application/json")
            .body(raw);
        if let Some(signature) = signature {
            request = request.header(CALLBACK_SIGNATURE_HEADER, signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    // =========================================================================
    // Seeding through the admin API
    // =========================================================================

    pub async fn seed_package(&self, monthly_price_idr: &str) -> Uuid {
        let response = self
            .admin_post(
                "/admin/packages",
                &json!({ "name": "Basic", "monthly_price_idr": monthly_price_idr }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(&response.json::<Value>().await.unwrap())
    }

    pub async fn seed_addon(&self, price_idr: &str) -> Uuid {
        let response = self
            .admin_post(
                "/admin/addons",
                &json!({ "name": "Extra number", "price_idr": price_idr }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(&response.json::<Value>().await.unwrap())
    }

    /// IDR gateway method with a fixed fee.
    pub async fn seed_gateway_method(&self, code: &str, fixed_fee: &str) -> Uuid {
        let response = self
            .admin_post(
                "/admin/payment-methods",
                &json!({
                    "code": code,
                    "name": format!("{} virtual account", code),
                    "currency": "idr",
                    "fee": { "type": "fixed", "value": fixed_fee },
                    "gateway_code": code,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(&response.json::<Value>().await.unwrap())
    }

    /// IDR bank transfer method without a fee.
    pub async fn seed_bank_method(&self, code: &str) -> Uuid {
        let response = self
            .admin_post(
                "/admin/bank-details",
                &json!({
                    "bank_name": "BCA",
                    "account_number": "8800123456",
                    "account_holder": "PT Contoh Digital",
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let bank_id = id_of(&response.json::<Value>().await.unwrap());

        let response = self
            .admin_post(
                "/admin/payment-methods",
                &json!({
                    "code": code,
                    "name": "Manual bank transfer",
                    "currency": "idr",
                    "fee": { "type": "fixed", "value": "0" },
                    "bank_detail_id": bank_id,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(&response.json::<Value>().await.unwrap())
    }

    pub async fn seed_voucher(&self, body: Value) -> Uuid {
        let response = self.admin_post("/admin/vouchers", &body).await;
        assert_eq!(response.status().as_u16(), 201);
        id_of(&response.json::<Value>().await.unwrap())
    }

    /// Answer every charge request with `external_id`.
    pub async fn mock_charge(&self, external_id: &str) {
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": external_id,
                "payment_url": format!("https://pay.example.com/{}", external_id),
            })))
            .mount(&self.gateway)
            .await;
    }

    /// Answer only the next charge request with `external_id`.
    pub async fn mock_charge_once(&self, external_id: &str) {
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": external_id,
                "payment_url": format!("https://pay.example.com/{}", external_id),
            })))
            .up_to_n_times(1)
            .mount(&self.gateway)
            .await;
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Check out `months` of a package and return the response body.
    pub async fn checkout_subscription(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        months: i32,
        voucher_code: Option<&str>,
    ) -> Response {
        let mut body = json!({
            "currency": "idr",
            "items": [
                { "type": "whatsapp_subscription", "package_id": package_id, "duration_months": months }
            ]
        });
        if let Some(code) = voucher_code {
            body["voucher_code"] = json!(code);
        }
        self.post_as(user_id, "/checkout", &body).await
    }

    /// Checkout and return the new transaction id.
    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        voucher_code: Option<&str>,
    ) -> Uuid {
        let response = self
            .checkout_subscription(user_id, package_id, 1, voucher_code)
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        id_of(&body["transaction"])
    }

    pub async fn initiate_payment(&self, user_id: Uuid, transaction_id: Uuid, method: &str) -> Response {
        self.post_as(
            user_id,
            &format!("/transactions/{}/payment", transaction_id),
            &json!({ "method": method }),
        )
        .await
    }

    pub async fn transaction(&self, user_id: Uuid, transaction_id: Uuid) -> Value {
        let response = self
            .get_as(user_id, &format!("/transactions/{}", transaction_id))
            .await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

pub fn id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().expect("id missing")).expect("id is not a UUID")
}

/// Read a decimal rendered either as a JSON string or number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("not a decimal"),
        Value::Number(n) => n.to_string().parse().expect("not a decimal"),
        other => panic!("expected an amount, got {}", other),
    }
}
