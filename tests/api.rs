mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tower::ServiceExt;

use common::{services, MockBackend, PASSWORD};
use hotstore::account::types::SubscriptionUpdate;
use hotstore::web::{router, AppState};

const WEBHOOK_SECRET: &str = "whsec_test";

fn app_state(backend: Arc<MockBackend>) -> AppState {
    AppState {
        services: Arc::new(services(backend)),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    }
}

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// `session=<token>` from a `Set-Cookie` header
fn session_pair(response: &reqwest::Response) -> String {
    let raw = response.headers()[SET_COOKIE].to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

fn sign(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[tokio::test]
async fn test_health_in_process() {
    let app = router(app_state(Arc::new(MockBackend::default())));
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sign_up_then_provision_store() {
    let backend = Arc::new(MockBackend::default());
    let state = app_state(backend.clone());
    let services = state.services.clone();
    let base = serve(state).await;
    let http = client();

    let signed_up = http
        .post(format!("{}/api/sign-up", base))
        .form(&[("email", "owner@shop.io"), ("password", PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(signed_up.status(), reqwest::StatusCode::SEE_OTHER);
    assert_eq!(signed_up.headers()[LOCATION], "/dashboard");
    let cookie = session_pair(&signed_up);
    assert!(cookie.starts_with("session="));

    let me: Value = http
        .get(format!("{}/api/user", base))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["data"]["user"]["email"], "owner@shop.io");
    assert!(me["data"]["user"].get("passwordHash").is_none());

    let store_form = [("email", "owner@shop.io"), ("password", "processor-pass")];
    let unpaid: Value = http
        .post(format!("{}/api/store", base))
        .header(COOKIE, &cookie)
        .form(&store_form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        unpaid["error"],
        "You need an active or trialing subscription to create a store and wallets."
    );

    let user = services.db.find_user_by_email("owner@shop.io").unwrap().unwrap();
    let team = services.team_of(user.id).unwrap().unwrap();
    services
        .db
        .update_team_subscription(
            team.id,
            &SubscriptionUpdate {
                stripe_customer_id: Some("cus_e2e".to_string()),
                stripe_subscription_id: Some("sub_e2e".to_string()),
                stripe_product_id: Some("prod_base".to_string()),
                plan_name: Some("Base".to_string()),
                subscription_status: "trialing".to_string(),
            },
        )
        .unwrap();

    let created: Value = http
        .post(format!("{}/api/store", base))
        .header(COOKIE, &cookie)
        .form(&store_form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        created["success"],
        "Store, BTC wallet, LBTC wallet, USDT wallet, LCAD wallet created successfully."
    );
    assert_eq!(created["data"]["store"]["id"], "store-1");
    assert_eq!(backend.calls(), (1, 4));

    let activity: Value = http
        .get(format!("{}/api/activity", base))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(activity["data"]["activity"][0]["action"], "CREATE_STORE");

    let signed_out = http
        .post(format!("{}/api/sign-out", base))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(signed_out.status(), reqwest::StatusCode::SEE_OTHER);
    assert_eq!(signed_out.headers()[LOCATION], "/sign-in");
    assert!(signed_out.headers()[SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));
}

#[tokio::test]
async fn test_requests_without_session() {
    let base = serve(app_state(Arc::new(MockBackend::default()))).await;
    let http = client();

    let me: Value = http
        .get(format!("{}/api/user", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me, json!({ "error": "User is not authenticated" }));

    // a forged cookie is treated as no session at all
    let forged: Value = http
        .get(format!("{}/api/team", base))
        .header(COOKIE, "session=1.9999999999.deadbeef")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forged["error"], "User is not authenticated");

    let plans: Value = http
        .get(format!("{}/api/pricing", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plans["data"]["plans"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_webhook_cancels_subscription() {
    let state = app_state(Arc::new(MockBackend::default()));
    let services = state.services.clone();
    let team = services.db.create_team("t").unwrap();
    services
        .db
        .update_team_subscription(
            team.id,
            &SubscriptionUpdate {
                stripe_customer_id: Some("cus_hook".to_string()),
                stripe_subscription_id: Some("sub_hook".to_string()),
                stripe_product_id: Some("prod_base".to_string()),
                plan_name: Some("Base".to_string()),
                subscription_status: "active".to_string(),
            },
        )
        .unwrap();
    let base = serve(state).await;
    let http = client();

    let payload = json!({
        "type": "customer.subscription.deleted",
        "data": { "object": {
            "id": "sub_hook",
            "customer": "cus_hook",
            "status": "canceled",
            "items": { "data": [] }
        }}
    })
    .to_string();

    let forged = http
        .post(format!("{}/api/stripe/webhook", base))
        .header("Stripe-Signature", "t=1,v1=00")
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), reqwest::StatusCode::BAD_REQUEST);

    let accepted = http
        .post(format!("{}/api/stripe/webhook", base))
        .header("Stripe-Signature", sign(&payload, chrono::Utc::now().timestamp()))
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);

    let team = services.db.get_team(team.id).unwrap().unwrap();
    assert_eq!(team.subscription_status.as_deref(), Some("canceled"));
    assert!(team.plan_name.is_none());
    assert!(!team.has_paid_plan());
}

async fn anonymous_checkout(body: &'static str) -> axum::response::Response {
    let app = router(app_state(Arc::new(MockBackend::default())));
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/billing/checkout")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_anonymous_checkout_escapes_price_id() {
    let response = anonymous_checkout("priceId=price_1%26redirect%3Dhttps%3A%2F%2Fevil.io").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[axum::http::header::LOCATION],
        "/sign-up?redirect=checkout&priceId=price_1%26redirect%3Dhttps%3A%2F%2Fevil.io"
    );

    let response = anonymous_checkout("priceId=a%0Ab").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[axum::http::header::LOCATION],
        "/sign-up?redirect=checkout&priceId=a%0Ab"
    );
}

#[tokio::test]
async fn test_webhook_activates_subscription() {
    let state = app_state(Arc::new(MockBackend::default()));
    let services = state.services.clone();
    let team = services.db.create_team("t").unwrap();
    services
        .db
        .update_team_subscription(
            team.id,
            &SubscriptionUpdate {
                stripe_customer_id: Some("cus_up".to_string()),
                subscription_status: "incomplete".to_string(),
                ..SubscriptionUpdate::default()
            },
        )
        .unwrap();
    let base = serve(state).await;

    let payload = json!({
        "type": "customer.subscription.updated",
        "data": { "object": {
            "id": "sub_up",
            "customer": "cus_up",
            "status": "active",
            "items": { "data": [{ "price": { "product": "prod_plus" } }] }
        }}
    })
    .to_string();
    let accepted = client()
        .post(format!("{}/api/stripe/webhook", base))
        .header("Stripe-Signature", sign(&payload, chrono::Utc::now().timestamp()))
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);

    let team = services.db.get_team(team.id).unwrap().unwrap();
    assert_eq!(team.stripe_subscription_id.as_deref(), Some("sub_up"));
    assert_eq!(team.stripe_product_id.as_deref(), Some("prod_plus"));
    assert_eq!(team.plan_name.as_deref(), Some("Plus"));
    assert_eq!(team.subscription_status.as_deref(), Some("active"));
    assert!(team.can_provision());
}
