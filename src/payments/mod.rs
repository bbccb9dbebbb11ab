//! Checkout and payment coordination.
//!
//! Order creation goes through [`PaymentOrchestrator::submit_order`]. Cash
//! orders are confirmed as soon as the backend accepts them. Non-cash orders
//! open the gateway page in an embedded browser surface and start a status
//! poller that races a fixed ceiling.

mod navigation;
mod orchestrator;
pub mod poller;
mod status;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::error::{ClientError, ClientResult, ValidationIssue};
use crate::session::Session;

pub use navigation::{
    BrowserSurface, ExternalOpener, InterceptReason, NavigationDecision, NavigationPolicy,
    SystemOpener,
};
pub use orchestrator::PaymentOrchestrator;
pub use poller::{poll_until_terminal, watch_payment, PollOutcome};
pub use status::OrderStatus;

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderMethod {
    #[serde(rename = "Makan di Tempat")]
    DineIn,
    #[serde(rename = "Bungkus")]
    TakeAway,
    #[serde(rename = "Diantar")]
    Delivery,
}

impl OrderMethod {
    pub fn is_delivery(self) -> bool {
        matches!(self, Self::Delivery)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "Tunai")]
    Cash,
    #[serde(rename = "Non-Tunai")]
    NonCash,
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Fee breakdown. The grand total is always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
}

impl OrderTotals {
    pub fn total(&self) -> Decimal {
        self.subtotal + self.service_fee + self.delivery_fee
    }
}

/// Service fee is a flat rate of the subtotal; delivery adds a fixed fee.
pub fn compute_total(subtotal: Decimal, method: OrderMethod, config: &PaymentConfig) -> OrderTotals {
    let delivery_fee = if method.is_delivery() {
        config.delivery_fee
    } else {
        Decimal::ZERO
    };
    OrderTotals {
        subtotal,
        service_fee: config.service_fee_rate * subtotal,
        delivery_fee,
    }
}

// ---------------------------------------------------------------------------
// Checkout form
// ---------------------------------------------------------------------------

/// Free-text fields entered on the order screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerForm {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub table_number: String,
    pub note: String,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Required-field checks, run before anything is sent.
///
/// Returns the chosen payment method so callers do not have to unwrap it
/// again.
pub fn validate_checkout(
    form: &CustomerForm,
    method: OrderMethod,
    payment: Option<PaymentMethod>,
) -> ClientResult<PaymentMethod> {
    let payment = match payment {
        Some(p) if !blank(&form.name) => p,
        _ => return Err(ClientError::Validation(ValidationIssue::NameAndPaymentMethod)),
    };
    if method.is_delivery() {
        if blank(&form.phone) || blank(&form.address) {
            return Err(ClientError::Validation(ValidationIssue::PhoneAndAddress));
        }
    } else if blank(&form.table_number) {
        return Err(ClientError::Validation(ValidationIssue::TableNumber));
    }
    Ok(payment)
}

// ---------------------------------------------------------------------------
// Order shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "_id")]
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

pub fn order_subtotal(lines: &[OrderLine]) -> Decimal {
    lines.iter().map(OrderLine::line_total).sum()
}

/// Body of `POST /api/order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub name: String,
    pub method: OrderMethod,
    pub items: Vec<OrderLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub service_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub payment: PaymentMethod,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl CreateOrderRequest {
    /// Delivery orders carry phone and address; the others a table number.
    pub fn new(
        form: &CustomerForm,
        items: Vec<OrderLine>,
        method: OrderMethod,
        payment: PaymentMethod,
        totals: &OrderTotals,
    ) -> Self {
        let (table_number, phone, address) = if method.is_delivery() {
            (
                None,
                Some(form.phone.trim().to_string()),
                Some(form.address.trim().to_string()),
            )
        } else {
            (Some(form.table_number.trim().to_string()), None, None)
        };
        Self {
            name: form.name.trim().to_string(),
            method,
            items,
            subtotal: totals.subtotal,
            service_fee: totals.service_fee,
            delivery_fee: totals.delivery_fee,
            total_amount: totals.total(),
            payment,
            note: form.note.trim().to_string(),
            table_number,
            phone,
            address,
        }
    }
}

#[cfg(test)]
impl CreateOrderRequest {
    pub(crate) fn for_test(method: OrderMethod, payment: PaymentMethod, subtotal: Decimal) -> Self {
        let form = CustomerForm {
            name: "Sari".into(),
            phone: "081234567890".into(),
            address: "Jl. Mawar 1".into(),
            table_number: "7".into(),
            note: String::new(),
        };
        let items = vec![OrderLine {
            item_id: "food-1".into(),
            name: "Nasi Goreng".into(),
            quantity: 1,
            price: subtotal,
        }];
        let totals = compute_total(subtotal, method, &PaymentConfig::default());
        Self::new(&form, items, method, payment, &totals)
    }
}

/// What the backend returned for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    /// Gateway page for non-cash payment.
    pub redirect_url: Option<String>,
}

/// A submitted order as the client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub method: OrderMethod,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
}

impl Order {
    pub fn total(&self) -> Decimal {
        self.subtotal + self.service_fee + self.delivery_fee
    }
}

/// Order endpoints used by checkout and the status poller.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn create_order(
        &self,
        session: &Session,
        request: &CreateOrderRequest,
    ) -> ClientResult<CreatedOrder>;

    /// Raw status string for `order_id`.
    async fn order_status(&self, session: &Session, order_id: &str) -> ClientResult<String>;
}
