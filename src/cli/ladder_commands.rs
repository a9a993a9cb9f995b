// Ladder command implementations
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use ampl_ladder::{
    ExchangeKind, ExchangePort, KucoinClient, LadderConfig, LadderError, LadderReconciler,
    LadderResult, LadderState, PaperExchange,
};

type Reconciler = LadderReconciler<Arc<dyn ExchangePort>>;

pub fn print_report<T: Serialize>(report: &T) -> LadderResult<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn build_exchange(config: &LadderConfig) -> LadderResult<Arc<dyn ExchangePort>> {
    let exchange: Arc<dyn ExchangePort> = match config.exchange.kind {
        ExchangeKind::Paper => {
            info!("🧪 Using paper exchange @ {:.4}", config.exchange.paper_price);
            Arc::new(
                PaperExchange::new(
                    config.ladder.symbol.clone(),
                    config.ladder.base_asset.clone(),
                    config.exchange.paper_price,
                )
                .with_balance(config.exchange.paper_balance),
            )
        }
        ExchangeKind::Kucoin => {
            info!("🔗 Using KuCoin REST at {}", config.exchange.rest_url);
            Arc::new(KucoinClient::from_config(&config.exchange)?)
        }
    };
    Ok(exchange)
}

/// Reconciler plus the saved state, refreshed from the exchange's live orders.
///
/// Detection only sees resting orders, so a buy that filled since the last
/// command is known only from the saved state.
async fn connect(config: &LadderConfig) -> LadderResult<(Reconciler, LadderState)> {
    let exchange = build_exchange(config)?;
    let reconciler = LadderReconciler::new(config.ladder.clone(), exchange)?;
    let mut state = load_state(config)?;

    let detection = reconciler.detect_existing(&mut state).await;
    info!(
        "🔍 Found {} ladder buy order(s), system {}",
        detection.buy_orders_count,
        if state.enabled { "enabled" } else { "disabled" }
    );
    for error in &detection.errors {
        warn!("⚠️  Detection: {}", error.message);
    }

    Ok((reconciler, state))
}

/// The paper book dies with the process, so only live exchanges keep state
fn persists_state(config: &LadderConfig) -> bool {
    config.exchange.kind != ExchangeKind::Paper
}

fn load_state(config: &LadderConfig) -> LadderResult<LadderState> {
    if !persists_state(config) {
        return Ok(LadderState::default());
    }
    LadderState::load_or_default(&config.monitoring.state_file)
}

fn save_state(config: &LadderConfig, state: &LadderState) -> LadderResult<()> {
    if !persists_state(config) {
        return Ok(());
    }
    state.to_file(&config.monitoring.state_file)?;
    debug!("💾 Saved state to {}", config.monitoring.state_file);
    Ok(())
}

pub async fn detect(config: &LadderConfig) -> LadderResult<()> {
    let exchange = build_exchange(config)?;
    let reconciler = LadderReconciler::new(config.ladder.clone(), exchange)?;
    let mut state = load_state(config)?;
    let report = reconciler.detect_existing(&mut state).await;
    save_state(config, &state)?;
    print_report(&report)
}

pub async fn reconcile(config: &LadderConfig) -> LadderResult<()> {
    let (reconciler, mut state) = connect(config).await?;
    let report = reconciler.reconcile(&mut state).await;
    save_state(config, &state)?;
    print_report(&report)
}

pub async fn monitor(config: &LadderConfig) -> LadderResult<()> {
    let (reconciler, mut state) = connect(config).await?;
    let report = reconciler.monitor_fills(&mut state).await;
    save_state(config, &state)?;
    print_report(&report)
}

pub async fn status(config: &LadderConfig) -> LadderResult<()> {
    let (reconciler, state) = connect(config).await?;
    let report = reconciler.get_status(&state).await;
    save_state(config, &state)?;
    print_report(&report)
}

pub async fn toggle(config: &LadderConfig, enable: bool) -> LadderResult<()> {
    let (reconciler, mut state) = connect(config).await?;

    // Any live ladder order means there is something to drain, even below the
    // detection threshold
    if !enable && state.tracked_len() > 0 {
        state.enabled = true;
    }

    let report = reconciler.toggle(&mut state, enable).await;
    save_state(config, &state)?;
    print_report(&report)
}

/// Invocation loop: one reconcile + fill pass per interval until Ctrl-C.
/// Passes run back to back on this task, never concurrently.
pub async fn run(config: &LadderConfig, enable: bool) -> LadderResult<()> {
    let (reconciler, mut state) = connect(config).await?;

    if enable && !state.enabled {
        let report = reconciler.enable(&mut state).await;
        info!("{}", report.message);
        save_state(config, &state)?;
    }

    if !state.enabled {
        warn!("⏸️  Ladder is disabled; pass --enable to bootstrap it");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.monitoring.check_interval_seconds));
    info!("⏱️  Checking every {}s (Ctrl-C to stop)", config.monitoring.check_interval_seconds);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let placement = reconciler.reconcile(&mut state).await;
                if !placement.orders_placed.is_empty() || !placement.errors.is_empty() {
                    print_report(&placement)?;
                }

                let fills = reconciler.monitor_fills(&mut state).await;
                if fills.orders_filled > 0 || fills.orders_cancelled > 0 || !fills.errors.is_empty() {
                    print_report(&fills)?;
                }

                save_state(config, &state)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Stopping; {} order(s) tracked", state.tracked_len());
                break;
            }
        }
    }

    Ok(())
}

/// Paper-exchange demo: random-walk the price, rebase periodically, and run a
/// fill pass after every tick.
pub async fn simulate(
    config: &LadderConfig,
    ticks: usize,
    seed: u64,
    volatility: f64,
    rebase_every: usize,
) -> LadderResult<()> {
    if !(volatility >= 0.0 && volatility.is_finite()) {
        return Err(LadderError::ConfigValidation(format!(
            "volatility must be a finite non-negative fraction, got {}", volatility
        )));
    }

    let settings = config.ladder.clone();
    let paper = Arc::new(
        PaperExchange::new(settings.symbol.clone(), settings.base_asset.clone(), config.exchange.paper_price)
            .with_balance(config.exchange.paper_balance),
    );
    let reconciler = LadderReconciler::new(settings, paper.clone())?;
    let mut state = LadderState::default();
    let mut rng = StdRng::seed_from_u64(seed);

    let enabled = reconciler.enable(&mut state).await;
    info!("{}", enabled.message);

    let (mut fills, mut sells, mut protections, mut replaced) = (0, 0, 0, 0);

    for tick in 1..=ticks {
        let (price, crossed) = paper.step_random(&mut rng, volatility)?;
        if !crossed.is_empty() {
            info!("📉 Tick {}: price {:.4} crossed {} order(s)", tick, price, crossed.len());
        }

        if rebase_every > 0 && tick % rebase_every == 0 {
            let factor = rng.gen_range(0.9..1.1);
            paper.apply_rebase(factor)?;
        }

        let report = reconciler.monitor_fills(&mut state).await;
        fills += report.orders_filled;
        sells += report.sell_orders_placed;
        protections += report.rebase_protections;
        replaced += report.replacement_orders;
    }

    info!(
        "🏁 Simulation done: {} fills, {} sells, {} rebase protections, {} replacements",
        fills, sells, protections, replaced
    );

    let status = reconciler.get_status(&state).await;
    print_report(&status)
}
