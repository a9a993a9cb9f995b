// Core ladder logic: level matching, reconciliation and fill handling

pub mod types;
pub mod ladder;
pub mod report;
pub mod reconciler;
pub mod fill_monitor;

// Re-export commonly used types
pub use types::{LadderState, TrackedOrder};
pub use ladder::{Ladder, prices_match, round_to_decimals};
pub use report::{
    CancelReport, DetectionReport, ErrorScope, FillReport, OperationError, PlacedOrder,
    PlacementReport, RebaseProtection, ReconcileAction, SellPlaced, StatusReport, SystemHealth,
    ToggleReport,
};
pub use reconciler::LadderReconciler;
pub use fill_monitor::{rebase_guard, sell_price, SellDecision};
