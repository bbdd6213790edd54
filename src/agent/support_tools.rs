//! Built-in customer-support tools.
//!
//! Outputs are simulated but deterministic: every field is derived from
//! the arguments, so identical calls always produce identical results.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::tool::{Tool, ToolArguments, ToolRegistry, parse_args, schema_for_args};
use crate::embedding::fnv1a;
use crate::error::{AgentError, ToolExecutionError};

const ORDER_STATUSES: [&str; 4] = ["processing", "shipped", "delivered", "pending"];

fn non_empty(tool: &str, field: &str, value: &str) -> Result<(), ToolExecutionError> {
    if value.trim().is_empty() {
        return Err(ToolExecutionError {
            tool: tool.to_string(),
            message: format!("{field} must not be empty"),
            timed_out: false,
        });
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn cents_to_amount(cents: u64) -> f64 {
    cents as f64 / 100.0
}

/// Arguments for `get_order_status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OrderStatusArgs {
    /// The order ID to look up.
    pub order_id: String,
}

/// Arguments for `cancel_subscription`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelSubscriptionArgs {
    /// The subscription ID to cancel.
    pub subscription_id: String,
    /// Optional reason for cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Arguments for `update_shipping_address`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateShippingAddressArgs {
    /// Order ID.
    pub order_id: String,
    /// Street address.
    pub address: String,
    /// City.
    pub city: String,
    /// ZIP code.
    pub zip_code: String,
}

/// Arguments for `get_account_balance`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AccountBalanceArgs {
    /// User ID to look up.
    pub user_id: String,
}

/// Looks up an order's status.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOrderStatus;

#[async_trait]
impl Tool for GetOrderStatus {
    fn name(&self) -> &'static str {
        "get_order_status"
    }

    fn description(&self) -> &'static str {
        "Get the status of an order by order ID"
    }

    fn parameters(&self) -> Value {
        schema_for_args::<OrderStatusArgs>()
    }

    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError> {
        let args: OrderStatusArgs = parse_args(self.name(), args)?;
        let order_id = args.order_id.trim();
        non_empty(self.name(), "order_id", order_id)?;

        let h = fnv1a(order_id.as_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let status = ORDER_STATUSES[(h % ORDER_STATUSES.len() as u64) as usize];
        Ok(json!({
            "order_id": order_id,
            "status": status,
            "estimated_delivery_days": 1 + (h >> 8) % 7,
            "tracking_number": format!("TRK{}", 100_000 + (h >> 16) % 900_000),
            "items": 1 + (h >> 40) % 5,
        }))
    }
}

/// Cancels a subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelSubscription;

#[async_trait]
impl Tool for CancelSubscription {
    fn name(&self) -> &'static str {
        "cancel_subscription"
    }

    fn description(&self) -> &'static str {
        "Cancel a subscription"
    }

    fn parameters(&self) -> Value {
        schema_for_args::<CancelSubscriptionArgs>()
    }

    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError> {
        let args: CancelSubscriptionArgs = parse_args(self.name(), args)?;
        let subscription_id = args.subscription_id.trim();
        non_empty(self.name(), "subscription_id", subscription_id)?;

        let h = fnv1a(subscription_id.as_bytes());
        Ok(json!({
            "success": true,
            "subscription_id": subscription_id,
            "reason": args.reason.filter(|r| !r.trim().is_empty()),
            "refund_amount": cents_to_amount(1_000 + h % 9_000),
            "message": "Subscription cancelled successfully. Refund will be processed in 3-5 business days.",
        }))
    }
}

/// Updates the shipping address of an order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateShippingAddress;

#[async_trait]
impl Tool for UpdateShippingAddress {
    fn name(&self) -> &'static str {
        "update_shipping_address"
    }

    fn description(&self) -> &'static str {
        "Update the shipping address for an order"
    }

    fn parameters(&self) -> Value {
        schema_for_args::<UpdateShippingAddressArgs>()
    }

    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError> {
        let args: UpdateShippingAddressArgs = parse_args(self.name(), args)?;
        for (field, value) in [
            ("order_id", &args.order_id),
            ("address", &args.address),
            ("city", &args.city),
            ("zip_code", &args.zip_code),
        ] {
            non_empty(self.name(), field, value)?;
        }
        Ok(json!({
            "success": true,
            "order_id": args.order_id.trim(),
            "new_address": {
                "street": args.address.trim(),
                "city": args.city.trim(),
                "zip_code": args.zip_code.trim(),
            },
            "message": "Shipping address updated successfully.",
        }))
    }
}

/// Reports a user's account balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetAccountBalance;

#[async_trait]
impl Tool for GetAccountBalance {
    fn name(&self) -> &'static str {
        "get_account_balance"
    }

    fn description(&self) -> &'static str {
        "Get account balance for a user"
    }

    fn parameters(&self) -> Value {
        schema_for_args::<AccountBalanceArgs>()
    }

    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError> {
        let args: AccountBalanceArgs = parse_args(self.name(), args)?;
        let user_id = args.user_id.trim();
        non_empty(self.name(), "user_id", user_id)?;

        let h = fnv1a(user_id.as_bytes());
        Ok(json!({
            "user_id": user_id,
            "balance": cents_to_amount(h % 100_000),
            "currency": "USD",
            "account_status": "active",
        }))
    }
}

/// Registry holding the four built-in support tools.
///
/// # Errors
///
/// Returns [`AgentError::Config`] only if two built-ins share a name.
pub fn support_registry() -> Result<ToolRegistry, AgentError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetOrderStatus))?;
    registry.register(Arc::new(CancelSubscription))?;
    registry.register(Arc::new(UpdateShippingAddress))?;
    registry.register(Arc::new(GetAccountBalance))?;
    Ok(registry)
}
