// Stripe REST client (form-encoded requests, bearer secret key)
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BillingError, BillingProvider, CheckoutCompletion, CheckoutRequest, Plan};

pub struct StripeBilling {
    api_url: String,
    secret_key: String,
    client: Client,
}

impl StripeBilling {
    pub fn new(api_url: &str, secret_key: &str, timeout: Duration) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, BillingError> {
        let response = request
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Billing provider returned {}: {}", status, body);
            return Err(BillingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::Decode(e.to_string()))
    }
}

/// Id of a field that may be expanded into an object or left as a bare id
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => value["id"].as_str().map(str::to_string),
        _ => None,
    }
}

fn str_field(value: &Value, field: &'static str) -> Result<String, BillingError> {
    value[field]
        .as_str()
        .map(str::to_string)
        .ok_or(BillingError::MissingField(field))
}

/// Product id of the first subscription item
pub(crate) fn subscription_product(subscription: &Value) -> Option<String> {
    let item = &subscription["items"]["data"][0];
    id_of(&item["price"]["product"]).or_else(|| id_of(&item["plan"]["product"]))
}

fn plan_from_price(price: &Value) -> Option<Plan> {
    let product = &price["product"];
    Some(Plan {
        price_id: price["id"].as_str().map(str::to_string),
        product_id: id_of(product),
        name: product["name"].as_str()?.to_string(),
        unit_amount: price["unit_amount"].as_u64().unwrap_or(0),
        currency: price["currency"].as_str().unwrap_or("usd").to_string(),
        interval: price["recurring"]["interval"]
            .as_str()
            .unwrap_or("month")
            .to_string(),
        trial_period_days: price["recurring"]["trial_period_days"]
            .as_u64()
            .unwrap_or(0) as u32,
    })
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError> {
        let mut form: Vec<(&str, String)> = vec![
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", request.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("mode", "subscription".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.client_reference_id.clone()),
            ("allow_promotion_codes", "true".to_string()),
            (
                "subscription_data[trial_period_days]",
                request.trial_days.to_string(),
            ),
        ];
        if let Some(customer) = &request.customer_id {
            form.push(("customer", customer.clone()));
        }

        debug!("Creating checkout session for price {}", request.price_id);
        let session = self.send(self.post("/v1/checkout/sessions").form(&form)).await?;
        str_field(&session, "url")
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, BillingError> {
        let form = [("customer", customer_id), ("return_url", return_url)];
        let session = self
            .send(self.post("/v1/billing_portal/sessions").form(&form))
            .await?;
        str_field(&session, "url")
    }

    async fn retrieve_checkout(&self, session_id: &str) -> Result<CheckoutCompletion, BillingError> {
        let path = format!("/v1/checkout/sessions/{}", session_id);
        let session = self
            .send(self.get(&path).query(&[("expand[]", "subscription")]))
            .await?;

        let customer_id = id_of(&session["customer"]).ok_or(BillingError::MissingField("customer"))?;
        let subscription = &session["subscription"];
        let subscription_id = id_of(subscription).ok_or(BillingError::MissingField("subscription"))?;
        let product_id = subscription_product(subscription)
            .ok_or(BillingError::MissingField("subscription product"))?;
        let status = str_field(subscription, "status")?;
        let plan_name = self.product_name(&product_id).await?;

        Ok(CheckoutCompletion {
            client_reference_id: session["client_reference_id"].as_str().map(str::to_string),
            customer_id,
            subscription_id,
            product_id,
            plan_name,
            status,
        })
    }

    async fn product_name(&self, product_id: &str) -> Result<String, BillingError> {
        let product = self
            .send(self.get(&format!("/v1/products/{}", product_id)))
            .await?;
        str_field(&product, "name")
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, BillingError> {
        let query = [
            ("active", "true"),
            ("type", "recurring"),
            ("expand[]", "data.product"),
        ];
        let prices = self.send(self.get("/v1/prices").query(&query)).await?;
        let plans = prices["data"]
            .as_array()
            .map(|data| data.iter().filter_map(plan_from_price).collect())
            .unwrap_or_default();
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_of_expanded_and_bare() {
        assert_eq!(id_of(&json!("cus_1")), Some("cus_1".to_string()));
        assert_eq!(id_of(&json!({"id": "cus_2", "email": "x"})), Some("cus_2".to_string()));
        assert_eq!(id_of(&Value::Null), None);
    }

    #[test]
    fn test_subscription_product_from_price_or_plan() {
        let with_price = json!({"items": {"data": [{"price": {"product": "prod_a"}}]}});
        assert_eq!(subscription_product(&with_price), Some("prod_a".to_string()));

        let with_plan = json!({"items": {"data": [{"plan": {"product": {"id": "prod_b"}}}]}});
        assert_eq!(subscription_product(&with_plan), Some("prod_b".to_string()));

        assert_eq!(subscription_product(&json!({"items": {"data": []}})), None);
    }

    #[test]
    fn test_plan_from_price() {
        let price = json!({
            "id": "price_1",
            "product": {"id": "prod_1", "name": "Base"},
            "unit_amount": 800,
            "currency": "usd",
            "recurring": {"interval": "month", "trial_period_days": 7}
        });
        let plan = plan_from_price(&price).unwrap();
        assert_eq!(plan.name, "Base");
        assert_eq!(plan.price_id.as_deref(), Some("price_1"));
        assert_eq!(plan.trial_period_days, 7);

        // unexpanded product carries no name
        assert!(plan_from_price(&json!({"id": "price_2", "product": "prod_2"})).is_none());
    }
}
