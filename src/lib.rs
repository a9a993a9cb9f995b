// AMPL Ladder Library
//
// Maintains a fixed ladder of limit buys on one pair, reconciles it against the
// exchange, and sells filled lots only when the live (rebasing) balance covers them.

pub mod core;
pub mod clients;
pub mod config;
pub mod error;

// Re-export core ladder types
pub use core::{
    Ladder, LadderReconciler, LadderState, TrackedOrder,
    CancelReport, DetectionReport, FillReport, PlacementReport, StatusReport, ToggleReport,
    OperationError, ErrorScope, ReconcileAction, SystemHealth, SellDecision,
};

// Re-export error types
pub use error::{LadderError, LadderResult};

// Re-export client types
pub use clients::{ExchangeError, ExchangeOrder, ExchangePort, KucoinClient, LimitOrder, OrderState, PaperExchange, Side};

// Re-export configuration
pub use config::{LadderConfig, LadderSettings, ExchangeConfig, ExchangeKind, MonitoringConfig, BalancePolicy, ConfigError};
