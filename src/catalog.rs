//! Food catalog and server-side cart.
//!
//! The cart lives on the backend as a map of item id to quantity; joining it
//! with the catalog produces the order lines checkout sends.

use std::collections::BTreeMap;

use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{
    decode, ensure_success, normalize_base_url, ApiClient, PATH_CART_ADD, PATH_CART_GET,
    PATH_CART_REMOVE, PATH_FOOD_LIST,
};
use crate::error::ClientResult;
use crate::payments::{order_subtotal, OrderLine};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
}

/// Quantities per item id, as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CartSnapshot {
    #[serde(rename = "cartData", default)]
    quantities: BTreeMap<String, i64>,
}

impl CartSnapshot {
    pub fn quantity_of(&self, item_id: &str) -> u32 {
        self.quantities
            .get(item_id)
            .copied()
            .map(|q| u32::try_from(q).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Badge count: sum of positive quantities.
    pub fn item_count(&self) -> u32 {
        self.quantities
            .values()
            .filter_map(|&q| u32::try_from(q).ok())
            .sum()
    }

    /// Join with the catalog. Unknown ids and non-positive quantities are
    /// skipped.
    pub fn resolve_lines(&self, menu: &[MenuItem]) -> Vec<OrderLine> {
        self.quantities
            .iter()
            .filter_map(|(id, &qty)| {
                let quantity = u32::try_from(qty).ok().filter(|q| *q > 0)?;
                let Some(item) = menu.iter().find(|m| &m.id == id) else {
                    debug!(item_id = %id, "Cart item missing from catalog");
                    return None;
                };
                Some(OrderLine {
                    item_id: item.id.clone(),
                    name: item.name.clone(),
                    quantity,
                    price: item.price,
                })
            })
            .collect()
    }
}

pub fn cart_subtotal(lines: &[OrderLine]) -> Decimal {
    order_subtotal(lines)
}

/// `<base>/images/<file>` for a catalog image name.
pub fn image_url(base_url: &str, image: &str) -> String {
    format!(
        "{}/images/{}",
        normalize_base_url(base_url),
        image.trim_start_matches('/')
    )
}

#[derive(Deserialize)]
struct MenuReply {
    #[serde(default)]
    data: Vec<MenuItem>,
}

impl ApiClient {
    pub async fn list_menu(&self) -> ClientResult<Vec<MenuItem>> {
        let reply = self.call(Method::GET, PATH_FOOD_LIST, None, &[], None).await?;
        ensure_success(&reply, "failed to load menu")?;
        let menu: MenuReply = decode(reply, "menu")?;
        debug!(items = menu.data.len(), "Menu loaded");
        Ok(menu.data)
    }

    pub async fn get_cart(&self, session: &Session) -> ClientResult<CartSnapshot> {
        let token = session.require_token()?;
        let reply = self
            .call(Method::POST, PATH_CART_GET, Some(token), &[], None)
            .await?;
        ensure_success(&reply, "failed to load cart")?;
        decode(reply, "cart")
    }

    pub async fn add_to_cart(&self, session: &Session, item_id: &str) -> ClientResult<()> {
        self.change_cart(session, PATH_CART_ADD, item_id).await
    }

    pub async fn remove_from_cart(&self, session: &Session, item_id: &str) -> ClientResult<()> {
        self.change_cart(session, PATH_CART_REMOVE, item_id).await
    }

    async fn change_cart(&self, session: &Session, path: &str, item_id: &str) -> ClientResult<()> {
        let token = session.require_token()?;
        let body = serde_json::json!({ "itemId": item_id, "quantity": 1 });
        let reply = self
            .call(Method::POST, path, Some(token), &[], Some(&body))
            .await?;
        ensure_success(&reply, "failed to update cart")?;
        info!(item_id, path, "Cart updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::UserProfile;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn menu() -> Vec<MenuItem> {
        serde_json::from_value(serde_json::json!([
            {"_id": "f1", "name": "Nasi Goreng", "price": 20000, "image": "nasgor.png", "category": "Nasi"},
            {"_id": "f2", "name": "Es Teh", "price": 5000.0, "image": "esteh.png"}
        ]))
        .expect("menu")
    }

    fn session() -> Session {
        Session::new(
            UserProfile {
                id: "u1".into(),
                name: "Sari".into(),
                email: None,
            },
            "tok-123",
        )
    }

    #[test]
    fn test_resolve_lines_and_subtotal() {
        let cart: CartSnapshot = serde_json::from_value(serde_json::json!({
            "success": true,
            "cartData": {"f1": 2, "f2": 3, "gone": 1, "f3": 0}
        }))
        .expect("cart");

        assert_eq!(cart.item_count(), 6);
        assert_eq!(cart.quantity_of("f2"), 3);
        assert_eq!(cart.quantity_of("nope"), 0);

        let lines = cart.resolve_lines(&menu());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].item_id, "f1");
        assert_eq!(cart_subtotal(&lines), dec!(55000));
    }

    #[test]
    fn test_image_url() {
        assert_eq!(
            image_url("https://api.example.com/", "nasgor.png"),
            "https://api.example.com/images/nasgor.png"
        );
    }

    #[tokio::test]
    async fn test_add_to_cart_posts_single_unit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH_CART_ADD))
            .and(header("authorization", "Bearer tok-123"))
            .and(body_json(serde_json::json!({"itemId": "f1", "quantity": 1})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&ClientConfig {
            api_base_url: server.uri(),
            ..ClientConfig::default()
        })
        .expect("client");
        api.add_to_cart(&session(), "f1").await.expect("add");
    }

    #[tokio::test]
    async fn test_list_menu() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PATH_FOOD_LIST))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [{"_id": "f1", "name": "Sate", "price": 25000}]
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(&ClientConfig {
            api_base_url: server.uri(),
            ..ClientConfig::default()
        })
        .expect("client");
        let items = api.list_menu().await.expect("menu");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, dec!(25000));
    }
}
