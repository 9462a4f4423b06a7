//! Typed operation builders
//!
//! One write-only façade per operation kind. Producers hand a typed
//! payload to the matching `queue_*` function; everything after that
//! (envelope, id, replay) is uniform. Adding a kind means adding a
//! payload struct, an `Operation` variant, and a façade function; the
//! queue and synchronizer stay untouched.
//!
//! Payloads serialize camelCase because that is what the remote API
//! expects; the stored payload is the exact replay body.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{HttpMethod, OperationKind};
use crate::queue::OperationQueue;

/// Sale of a stocked product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSalePayload {
    pub product_id: String,
    pub sold_quantity: u32,
    /// Unit price at the time of sale, when it differs from the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
}

/// Stock withdrawal without a sale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPayload {
    pub product_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// New product registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductAddPayload {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Service performed and posted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAddPayload {
    pub description: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
}

/// A write operation with its typed payload
///
/// The variant fixes kind, endpoint and verb; the synchronizer only
/// ever sees the resulting envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ProductSale(ProductSalePayload),
    Withdrawal(WithdrawalPayload),
    ProductAdd(ProductAddPayload),
    ServiceAdd(ServiceAddPayload),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ProductSale(_) => OperationKind::ProductSale,
            Operation::Withdrawal(_) => OperationKind::Withdrawal,
            Operation::ProductAdd(_) => OperationKind::ProductAdd,
            Operation::ServiceAdd(_) => OperationKind::ServiceAdd,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Operation::ProductSale(_) => "/api/products/sell",
            Operation::Withdrawal(_) => "/api/products/withdraw",
            Operation::ProductAdd(_) => "/api/products",
            Operation::ServiceAdd(_) => "/api/services",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Operation::ProductSale(_) => HttpMethod::Post,
            Operation::Withdrawal(_) => HttpMethod::Post,
            Operation::ProductAdd(_) => HttpMethod::Post,
            Operation::ServiceAdd(_) => HttpMethod::Post,
        }
    }

    /// The JSON body sent on replay
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Operation::ProductSale(p) => serde_json::to_value(p),
            Operation::Withdrawal(p) => serde_json::to_value(p),
            Operation::ProductAdd(p) => serde_json::to_value(p),
            Operation::ServiceAdd(p) => serde_json::to_value(p),
        }
    }
}

/// Queue a product sale for replay
pub fn queue_product_sale(queue: &OperationQueue, payload: ProductSalePayload) -> Result<String> {
    submit(queue, Operation::ProductSale(payload))
}

/// Queue a stock withdrawal for replay
pub fn queue_withdrawal(queue: &OperationQueue, payload: WithdrawalPayload) -> Result<String> {
    submit(queue, Operation::Withdrawal(payload))
}

/// Queue a product registration for replay
pub fn queue_product_add(queue: &OperationQueue, payload: ProductAddPayload) -> Result<String> {
    submit(queue, Operation::ProductAdd(payload))
}

/// Queue a service posting for replay
pub fn queue_service_add(queue: &OperationQueue, payload: ServiceAddPayload) -> Result<String> {
    submit(queue, Operation::ServiceAdd(payload))
}

fn submit(queue: &OperationQueue, operation: Operation) -> Result<String> {
    let body = operation
        .body()
        .context("Failed to encode operation payload")?;
    let id = queue
        .enqueue(
            operation.kind(),
            body,
            operation.endpoint(),
            operation.method(),
        )
        .with_context(|| format!("Failed to queue {} operation", operation.kind()))?;
    Ok(id)
}
