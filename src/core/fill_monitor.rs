// Fill monitoring and the rebase-protected sell
//
// AMPL balances change on rebase independently of trading, so a sell sized
// from the recorded purchase may exceed what the wallet actually holds. Every
// sell is therefore checked against a live balance read, never the record.

use tracing::{debug, error, info, warn};

use crate::clients::exchange::{ExchangePort, LimitOrder, OrderState, Side};
use crate::config::BalancePolicy;
use crate::core::ladder::round_to_decimals;
use crate::core::reconciler::LadderReconciler;
use crate::core::report::{FillReport, OperationError, RebaseProtection, SellPlaced};
use crate::core::types::{LadderState, TrackedOrder};
use crate::error::LadderError;

/// Decision for one filled buy
#[derive(Debug, Clone, PartialEq)]
pub enum SellDecision {
    Sell { price: f64, size: f64 },
    Protect { held: f64, needed: f64 },
}

/// Take-profit price for a purchase, rounded for submission
pub fn sell_price(purchase_price: f64, markup: f64, decimals: u32) -> f64 {
    round_to_decimals(purchase_price * markup, decimals)
}

/// Sell the recorded size only if the held quantity still covers it
pub fn rebase_guard(held: f64, purchase: &TrackedOrder, markup: f64, decimals: u32) -> SellDecision {
    if held >= purchase.size {
        SellDecision::Sell {
            price: sell_price(purchase.price, markup, decimals),
            size: purchase.size,
        }
    } else {
        SellDecision::Protect {
            held,
            needed: purchase.size,
        }
    }
}

impl<E: ExchangePort> LadderReconciler<E> {
    /// Resolve filled buys into sells, then refill the vacated levels.
    ///
    /// The base-asset balance is read once at the start of the pass and every
    /// fill in the pass is judged against that snapshot (or what is left of it
    /// under `BalancePolicy::Reserve`). Each tracked order is handled
    /// independently; a failure on one is recorded and the rest still run.
    pub async fn monitor_fills(&self, state: &mut LadderState) -> FillReport {
        let mut report = FillReport {
            enabled: state.enabled,
            ..FillReport::default()
        };

        if !state.enabled {
            debug!("Fill monitor skipped: system disabled");
            return report;
        }

        let settings = self.settings();

        let mut available = match self.exchange().get_account_balance(&settings.base_asset).await {
            Ok(balance) => balance,
            Err(e) => {
                let err = LadderError::from(e);
                error!("❌ Could not read {} balance, no fills judged this pass: {}", settings.base_asset, err);
                report.errors.push(OperationError::pass("balance", &err));
                return report;
            }
        };
        report.balance_snapshot = Some(available);

        for order in state.orders_to_check() {
            let status = match self.exchange().get_order_status(&order.order_id).await {
                Ok(status) => status,
                Err(e) => {
                    let err = LadderError::from(e);
                    error!("❌ Status check failed for {}: {}", order.order_id, err);
                    report.errors.push(OperationError::order(&order.order_id, &err));
                    continue;
                }
            };
            report.orders_checked += 1;

            match status {
                OrderState::Active => {
                    debug!("Buy {} at level {} still resting", order.order_id, order.level);
                    continue;
                }
                OrderState::Cancelled => {
                    warn!(
                        "🚫 Buy {} at level {} was cancelled outside the ladder, not selling",
                        order.order_id, order.level
                    );
                    report.orders_cancelled += 1;
                    state.release(&order.order_id);
                    continue;
                }
                OrderState::Inactive => {
                    // Could also be an external cancel; the exchange did not say
                    debug!("Buy {} inactive without a reason, treating as filled", order.order_id);
                }
                OrderState::Filled => {}
            }

            report.orders_filled += 1;

            match rebase_guard(available, &order, settings.markup, settings.price_decimals) {
                SellDecision::Sell { price, size } => {
                    let sell = LimitOrder {
                        symbol: settings.symbol.clone(),
                        side: Side::Sell,
                        size,
                        price,
                        client_oid: self.client_oid(Side::Sell, order.level),
                    };

                    match self.exchange().place_limit_order(&sell).await {
                        Ok(sell_order_id) => {
                            info!(
                                "💰 Buy {} filled @ {:.4}, placed SELL {} @ {:.4} (ID: {})",
                                order.order_id, order.price, size, price, sell_order_id
                            );
                            report.sell_orders_placed += 1;
                            report.sells.push(SellPlaced {
                                buy_order_id: order.order_id.clone(),
                                sell_order_id,
                                level: order.level,
                                price,
                                size,
                            });
                            if settings.balance_policy == BalancePolicy::Reserve {
                                available -= size;
                            }
                        }
                        Err(e) => {
                            let err = LadderError::from(e);
                            error!("❌ SELL for filled buy {} failed: {}", order.order_id, err);
                            report.errors.push(OperationError::order(&order.order_id, &err));
                        }
                    }
                }
                SellDecision::Protect { held, needed } => {
                    let message = format!(
                        "Insufficient {}. Have: {}, Need: {}",
                        settings.base_asset, held, needed
                    );
                    warn!("🛡️  Rebase protection for buy {}: {}", order.order_id, message);
                    report.rebase_protections += 1;
                    report.rebase_events.push(RebaseProtection {
                        order_id: order.order_id.clone(),
                        level: order.level,
                        purchase_price: order.price,
                        held,
                        needed,
                        shortfall: needed - held,
                        message,
                    });
                }
            }

            // Resolved either way; a skipped sell is not retried
            state.release(&order.order_id);
        }

        if report.orders_filled + report.orders_cancelled > 0 {
            let replacement = self.reconcile(state).await;
            report.replacement_orders = replacement.orders_placed.len();
            report.replacement = Some(replacement);
        }

        info!(
            "📊 Fill pass: checked {}, filled {}, cancelled {}, sells {}, protections {}, replaced {}",
            report.orders_checked,
            report.orders_filled,
            report.orders_cancelled,
            report.sell_orders_placed,
            report.rebase_protections,
            report.replacement_orders
        );

        report
    }
}
