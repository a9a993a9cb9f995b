// Structured results returned by every public reconciler operation

use serde::{Deserialize, Serialize};

use crate::clients::exchange::ExchangeOrder;
use crate::error::LadderError;

/// What an error entry refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorScope {
    Level { level: usize, price: f64 },
    Order { order_id: String },
    /// A pass-wide step such as the balance snapshot or the active-order query
    Pass { stage: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub scope: ErrorScope,
    pub category: String,
    pub retryable: bool,
    pub message: String,
}

impl OperationError {
    pub fn new(scope: ErrorScope, err: &LadderError) -> Self {
        Self {
            scope,
            category: err.category().to_string(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }

    pub fn level(level: usize, price: f64, err: &LadderError) -> Self {
        Self::new(ErrorScope::Level { level, price }, err)
    }

    pub fn order(order_id: &str, err: &LadderError) -> Self {
        Self::new(ErrorScope::Order { order_id: order_id.to_string() }, err)
    }

    pub fn pass(stage: &str, err: &LadderError) -> Self {
        Self::new(ErrorScope::Pass { stage: stage.to_string() }, err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub level: usize,
    pub price: f64,
    pub order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Reconciliation refused because the system is disabled
    Disabled,
    /// No buy orders existed, the whole ladder was placed
    Bootstrap,
    /// Only the unmatched levels were placed
    PlaceMissing,
    /// Every level already had a live buy order
    NothingMissing,
    /// The exchange could not be queried
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementReport {
    /// False if any level failed; `orders_placed` may still be non-empty
    pub success: bool,
    pub action: ReconcileAction,
    pub buy_orders_count: usize,
    pub orders_placed: Vec<PlacedOrder>,
    pub errors: Vec<OperationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PlacementReport {
    pub fn new(action: ReconcileAction) -> Self {
        Self {
            success: true,
            action,
            buy_orders_count: 0,
            orders_placed: Vec::new(),
            errors: Vec::new(),
            message: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            success: false,
            message: Some("System is disabled".to_string()),
            ..Self::new(ReconcileAction::Disabled)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReport {
    pub success: bool,
    pub cancel_attempts: usize,
    pub cancelled_orders: Vec<String>,
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleReport {
    pub success: bool,
    pub enabled: bool,
    /// False when the requested state was already in effect
    pub changed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancelReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub system_detected: bool,
    pub buy_orders_count: usize,
    pub buy_orders: Vec<ExchangeOrder>,
    /// Extra live orders at an already-matched level; not tracked
    pub duplicate_orders: Vec<ExchangeOrder>,
    pub missing_levels: Vec<usize>,
    pub enabled: bool,
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellPlaced {
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub level: usize,
    pub price: f64,
    pub size: f64,
}

/// A sell skipped because the live balance no longer covers the purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebaseProtection {
    pub order_id: String,
    pub level: usize,
    pub purchase_price: f64,
    pub held: f64,
    pub needed: f64,
    pub shortfall: f64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub enabled: bool,
    /// Balance snapshot the pass was judged against
    pub balance_snapshot: Option<f64>,
    pub orders_checked: usize,
    pub orders_filled: usize,
    pub orders_cancelled: usize,
    pub sell_orders_placed: usize,
    pub rebase_protections: usize,
    pub replacement_orders: usize,
    pub sells: Vec<SellPlaced>,
    pub rebase_events: Vec<RebaseProtection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<PlacementReport>,
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    Healthy,
    NeedsAttention,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub current_price: Option<f64>,
    pub balance: Option<f64>,
    pub buy_levels: Vec<f64>,
    pub active_buy_orders: usize,
    pub active_sell_orders: usize,
    pub buy_orders_detail: Vec<ExchangeOrder>,
    pub tracked_levels: Vec<usize>,
    pub system_health: SystemHealth,
    pub errors: Vec<OperationError>,
}
