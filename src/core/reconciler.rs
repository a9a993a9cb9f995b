// Ladder reconciler: lifecycle, detection, placement and status reporting
//
// Callers must serialize invocations. Nothing here locks the state, and the
// missing-level computation assumes no other pass is placing orders at the
// same time.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::clients::exchange::{ExchangeOrder, ExchangePort, LimitOrder, Side};
use crate::config::LadderSettings;
use crate::core::ladder::Ladder;
use crate::core::report::{
    CancelReport, DetectionReport, ErrorScope, OperationError, PlacedOrder, PlacementReport,
    ReconcileAction, StatusReport, SystemHealth, ToggleReport,
};
use crate::core::types::{LadderState, TrackedOrder};
use crate::error::{LadderError, LadderResult};

pub struct LadderReconciler<E: ExchangePort> {
    settings: LadderSettings,
    ladder: Ladder,
    exchange: E,
}

impl<E: ExchangePort> LadderReconciler<E> {
    pub fn new(settings: LadderSettings, exchange: E) -> LadderResult<Self> {
        settings.validate()?;
        let ladder = Ladder::new(settings.buy_levels.clone(), settings.match_tolerance)?;

        Ok(Self {
            settings,
            ladder,
            exchange,
        })
    }

    pub fn settings(&self) -> &LadderSettings {
        &self.settings
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Idempotency token: prefix, side, level and submission time in milliseconds
    pub(crate) fn client_oid(&self, side: Side, level: usize) -> String {
        format!(
            "{}_{}_{}_{}",
            self.settings.client_oid_prefix,
            side,
            level,
            Utc::now().timestamp_millis()
        )
    }

    pub async fn toggle(&self, state: &mut LadderState, enable: bool) -> ToggleReport {
        if enable {
            self.enable(state).await
        } else {
            self.disable(state).await
        }
    }

    /// Enable the ladder and run a full reconciliation pass
    pub async fn enable(&self, state: &mut LadderState) -> ToggleReport {
        if state.enabled {
            return ToggleReport {
                success: true,
                enabled: true,
                changed: false,
                message: "System already enabled".to_string(),
                placement: None,
                cancellation: None,
            };
        }

        state.enabled = true;
        info!("🟢 Ladder enabled for {}", self.settings.symbol);

        let placement = self.reconcile(state).await;
        let message = if placement.success {
            format!("System enabled, {} order(s) placed", placement.orders_placed.len())
        } else {
            format!(
                "System enabled with {} placement error(s)",
                placement.errors.len()
            )
        };

        ToggleReport {
            success: placement.success,
            enabled: true,
            changed: true,
            message,
            placement: Some(placement),
            cancellation: None,
        }
    }

    /// Disable the ladder and cancel its live buy orders.
    ///
    /// Cancellation is best-effort. Tracked orders are dropped afterwards even
    /// when some cancels failed, since a disabled ladder owns nothing.
    pub async fn disable(&self, state: &mut LadderState) -> ToggleReport {
        if !state.enabled {
            return ToggleReport {
                success: true,
                enabled: false,
                changed: false,
                message: "System already disabled".to_string(),
                placement: None,
                cancellation: None,
            };
        }

        state.enabled = false;
        info!("🔴 Ladder disabled for {}, cancelling buy orders", self.settings.symbol);

        let cancellation = self.cancel_ladder_orders(state).await;
        let message = format!(
            "System disabled, {}/{} buy order(s) cancelled",
            cancellation.cancelled_orders.len(),
            cancellation.cancel_attempts
        );

        ToggleReport {
            success: cancellation.success,
            enabled: false,
            changed: true,
            message,
            placement: None,
            cancellation: Some(cancellation),
        }
    }

    async fn cancel_ladder_orders(&self, state: &mut LadderState) -> CancelReport {
        let mut errors = Vec::new();

        let targets: Vec<String> = match self.exchange.get_active_orders(&self.settings.symbol).await {
            Ok(orders) => orders
                .into_iter()
                .filter(|o| o.side == Side::Buy && self.ladder.level_for_price(o.price).is_some())
                .map(|o| o.order_id)
                .collect(),
            Err(e) => {
                // Fall back to what we believe is live
                let err = LadderError::from(e);
                error!("❌ Could not list active orders before cancelling: {}", err);
                errors.push(OperationError::pass("active_orders", &err));
                state
                    .orders_to_check()
                    .into_iter()
                    .map(|o| o.order_id)
                    .collect()
            }
        };

        let mut cancelled_orders = Vec::new();
        for order_id in &targets {
            match self.exchange.cancel_order(order_id).await {
                Ok(()) => {
                    info!("🗑️  Cancelled buy order {}", order_id);
                    cancelled_orders.push(order_id.clone());
                }
                Err(e) => {
                    let err = LadderError::from(e);
                    warn!("⚠️  Failed to cancel {}: {}", order_id, err);
                    errors.push(OperationError::order(order_id, &err));
                }
            }
        }

        state.clear_tracked();

        CancelReport {
            success: errors.is_empty(),
            cancel_attempts: targets.len(),
            cancelled_orders,
            errors,
        }
    }

    /// Rebuild the tracked set from live exchange orders (startup / recovery).
    ///
    /// Never places orders. Enables the system when at least
    /// `detection_threshold` matching buy orders are found and otherwise
    /// leaves the enabled flag alone.
    pub async fn detect_existing(&self, state: &mut LadderState) -> DetectionReport {
        let active = match self.exchange.get_active_orders(&self.settings.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                let err = LadderError::from(e);
                error!("❌ Detection failed: {}", err);
                return DetectionReport {
                    system_detected: false,
                    buy_orders_count: 0,
                    buy_orders: Vec::new(),
                    duplicate_orders: Vec::new(),
                    missing_levels: Vec::new(),
                    enabled: state.enabled,
                    errors: vec![OperationError::pass("active_orders", &err)],
                };
            }
        };

        let mut buy_orders = Vec::new();
        let mut duplicate_orders = Vec::new();
        let mut seen_levels = BTreeSet::new();

        for order in active.into_iter().filter(|o| o.side == Side::Buy) {
            let Some(level) = self.ladder.level_for_price(order.price) else {
                debug!("Ignoring buy {} @ {:.4}: not a ladder level", order.order_id, order.price);
                continue;
            };

            if !seen_levels.insert(level) {
                warn!(
                    "⚠️  Second buy order {} at level {} ({:.4}), not tracking it",
                    order.order_id, level, order.price
                );
                duplicate_orders.push(order);
                continue;
            }

            state.occupy(TrackedOrder {
                order_id: order.order_id.clone(),
                price: order.price,
                size: order.size,
                level,
            });
            buy_orders.push(order);
        }

        let buy_orders_count = buy_orders.len() + duplicate_orders.len();
        let system_detected = buy_orders_count >= self.settings.detection_threshold;
        if system_detected && !state.enabled {
            state.enabled = true;
            info!("🔍 Detected {} ladder buy orders, system marked enabled", buy_orders_count);
        }

        let missing_levels = self.ladder.missing_levels(buy_orders.iter().map(|o| o.price));

        DetectionReport {
            system_detected,
            buy_orders_count,
            buy_orders,
            duplicate_orders,
            missing_levels,
            enabled: state.enabled,
            errors: Vec::new(),
        }
    }

    /// Place buy orders for every level without a live buy order.
    ///
    /// Missing levels are computed against the exchange's open orders, not the
    /// tracked set.
    pub async fn reconcile(&self, state: &mut LadderState) -> PlacementReport {
        if !state.enabled {
            debug!("Reconcile skipped: system disabled");
            return PlacementReport::disabled();
        }

        let active = match self.exchange.get_active_orders(&self.settings.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                let err = LadderError::from(e);
                error!("❌ Reconcile aborted, could not list active orders: {}", err);
                let mut report = PlacementReport::new(ReconcileAction::Aborted);
                report.success = false;
                report.errors.push(OperationError::pass("active_orders", &err));
                return report;
            }
        };

        let buy_orders: Vec<ExchangeOrder> = active.into_iter().filter(|o| o.side == Side::Buy).collect();

        if buy_orders.is_empty() {
            info!("📭 No buy orders on {}, placing full ladder", self.settings.symbol);
            let all_levels: Vec<usize> = (0..self.ladder.len()).collect();
            return self.place_levels(state, &all_levels, ReconcileAction::Bootstrap, 0).await;
        }

        self.adopt_untracked(state, &buy_orders);

        let missing = self.ladder.missing_levels(buy_orders.iter().map(|o| o.price));
        if missing.is_empty() {
            debug!("All {} ladder levels covered", self.ladder.len());
            let mut report = PlacementReport::new(ReconcileAction::NothingMissing);
            report.buy_orders_count = buy_orders.len();
            report.message = Some("All buy orders already in place".to_string());
            return report;
        }

        info!("🧩 {} ladder level(s) missing: {:?}", missing.len(), missing);
        self.place_levels(state, &missing, ReconcileAction::PlaceMissing, buy_orders.len()).await
    }

    /// Track live ladder orders sitting at levels whose slot is empty
    fn adopt_untracked(&self, state: &mut LadderState, buy_orders: &[ExchangeOrder]) {
        for order in buy_orders {
            let Some(level) = self.ladder.level_for_price(order.price) else {
                continue;
            };
            if state.tracked(level).is_none() && !state.is_tracking(&order.order_id) {
                debug!("Adopting untracked buy {} at level {}", order.order_id, level);
                state.occupy(TrackedOrder {
                    order_id: order.order_id.clone(),
                    price: order.price,
                    size: order.size,
                    level,
                });
            }
        }
    }

    /// Place one buy per level. Each level is independent: a failure is
    /// recorded and the remaining levels are still attempted.
    async fn place_levels(
        &self,
        state: &mut LadderState,
        levels: &[usize],
        action: ReconcileAction,
        existing_buys: usize,
    ) -> PlacementReport {
        let mut report = PlacementReport::new(action);
        report.buy_orders_count = existing_buys;

        for &level in levels {
            let price = match self.ladder.price_at(level) {
                Ok(price) => price,
                Err(err) => {
                    report.errors.push(OperationError::new(
                        ErrorScope::Level { level, price: 0.0 },
                        &err,
                    ));
                    report.success = false;
                    continue;
                }
            };

            let order = LimitOrder {
                symbol: self.settings.symbol.clone(),
                side: Side::Buy,
                size: self.settings.order_size,
                price,
                client_oid: self.client_oid(Side::Buy, level),
            };

            match self.exchange.place_limit_order(&order).await {
                Ok(order_id) => {
                    info!(
                        "📝 Placed BUY {} {} @ {:.4} (level {}, ID: {})",
                        order.size, self.settings.symbol, price, level, order_id
                    );
                    if let Some(previous) = state.occupy(TrackedOrder {
                        order_id: order_id.clone(),
                        price,
                        size: order.size,
                        level,
                    }) {
                        debug!("Order {} displaced from level {}, still awaiting resolution", previous.order_id, level);
                    }
                    report.orders_placed.push(PlacedOrder { level, price, order_id });
                }
                Err(e) => {
                    let err = LadderError::from(e);
                    error!("❌ Failed to place BUY at level {} ({:.4}): {}", level, price, err);
                    report.errors.push(OperationError::level(level, price, &err));
                    report.success = false;
                }
            }
        }

        report
    }

    /// Read-only snapshot of the ladder and the exchange. Never touches state.
    pub async fn get_status(&self, state: &LadderState) -> StatusReport {
        let mut errors = Vec::new();

        let current_price = match self.exchange.get_ticker_price(&self.settings.symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                errors.push(OperationError::pass("ticker", &LadderError::from(e)));
                None
            }
        };

        let balance = match self.exchange.get_account_balance(&self.settings.base_asset).await {
            Ok(available) => Some(available),
            Err(e) => {
                errors.push(OperationError::pass("balance", &LadderError::from(e)));
                None
            }
        };

        let (buy_orders_detail, active_sell_orders, system_health) =
            match self.exchange.get_active_orders(&self.settings.symbol).await {
                Ok(orders) => {
                    let (buys, sells): (Vec<ExchangeOrder>, Vec<ExchangeOrder>) =
                        orders.into_iter().partition(|o| o.side == Side::Buy);
                    let health = if buys.len() >= self.settings.health_threshold {
                        SystemHealth::Healthy
                    } else {
                        SystemHealth::NeedsAttention
                    };
                    (buys, sells.len(), health)
                }
                Err(e) => {
                    errors.push(OperationError::pass("active_orders", &LadderError::from(e)));
                    (Vec::new(), 0, SystemHealth::Error)
                }
            };

        StatusReport {
            enabled: state.enabled,
            current_price,
            balance,
            buy_levels: self.ladder.levels().to_vec(),
            active_buy_orders: buy_orders_detail.len(),
            active_sell_orders,
            buy_orders_detail,
            tracked_levels: state.tracked_levels(),
            system_health,
            errors,
        }
    }
}
