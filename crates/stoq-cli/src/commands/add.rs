//! Add command handlers
//!
//! Capture operations into the local queue. These work identically
//! online and offline; the orchestrator or a later `stoq sync` replays
//! them against the API.

use anyhow::Result;

use stoq_core::{
    queue_product_add, queue_product_sale, queue_service_add, queue_withdrawal, OperationQueue,
    ProductAddPayload, ProductSalePayload, ServiceAddPayload, WithdrawalPayload,
};

use crate::output::Output;

/// Record a product sale
pub fn sale(
    queue: &OperationQueue,
    product: String,
    quantity: u32,
    price: Option<f64>,
    output: &Output,
) -> Result<()> {
    let id = queue_product_sale(
        queue,
        ProductSalePayload {
            product_id: product,
            sold_quantity: quantity,
            sale_price: price,
        },
    )?;
    output.captured("Sale", &id);
    Ok(())
}

/// Record a stock withdrawal
pub fn withdrawal(
    queue: &OperationQueue,
    product: String,
    quantity: u32,
    reason: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = queue_withdrawal(
        queue,
        WithdrawalPayload {
            product_id: product,
            quantity,
            reason,
        },
    )?;
    output.captured("Withdrawal", &id);
    Ok(())
}

/// Record a new product
pub fn product(
    queue: &OperationQueue,
    name: String,
    quantity: u32,
    price: f64,
    category: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = queue_product_add(
        queue,
        ProductAddPayload {
            name,
            quantity,
            price,
            category,
        },
    )?;
    output.captured("Product", &id);
    Ok(())
}

/// Record a service sale
pub fn service(
    queue: &OperationQueue,
    description: String,
    price: f64,
    customer: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = queue_service_add(
        queue,
        ServiceAddPayload {
            description,
            price,
            customer,
        },
    )?;
    output.captured("Service", &id);
    Ok(())
}
