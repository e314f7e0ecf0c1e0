use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{ExitReason, Trade};

/// Equity the curve starts from when no account value is given
pub const DEFAULT_STARTING_EQUITY: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

const PERIODS_PER_YEAR: f64 = 252.0;

/// Results of an activation's closed trades
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of trades with positive PnL
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub average_pnl: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    /// Running PnL after each closed trade, in close order
    pub cumulative_pnl: Vec<Decimal>,
    /// Starting equity plus running PnL, one point per closed trade
    pub equity_curve: Vec<Decimal>,
    /// Mean over sample std of trade PnL, annualized by sqrt(252)
    pub sharpe_ratio: f64,
    /// Mean over sample std of losing trades' PnL, annualized by sqrt(252)
    pub sortino_ratio: f64,
    /// Largest peak-to-trough drop of the equity curve
    pub max_drawdown: Decimal,
    /// `max_drawdown` as a percentage of the peak it fell from
    pub max_drawdown_pct: Decimal,
}

impl PerformanceSummary {
    /// Summarize closed trades against [`DEFAULT_STARTING_EQUITY`]
    pub fn from_trades(trades: &[Trade]) -> Self {
        Self::with_starting_equity(trades, DEFAULT_STARTING_EQUITY)
    }

    /// Summarize closed trades; rejected entries never traded and are skipped
    pub fn with_starting_equity(trades: &[Trade], starting_equity: Decimal) -> Self {
        let mut closed: Vec<&Trade> = trades
            .iter()
            .filter(|t| !t.is_open())
            .filter(|t| t.exit_reason != Some(ExitReason::EntryRejected))
            .collect();
        closed.sort_by_key(|t| t.closed_at_ms.unwrap_or(t.opened_at_ms));

        let total_trades = closed.len();
        let winning_trades = closed.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let losing_trades = closed.iter().filter(|t| t.pnl < Decimal::ZERO).count();

        let mut running = Decimal::ZERO;
        let cumulative_pnl: Vec<Decimal> = closed
            .iter()
            .map(|t| {
                running += t.pnl;
                running
            })
            .collect();

        let equity_curve: Vec<Decimal> = cumulative_pnl
            .iter()
            .map(|pnl| starting_equity + pnl)
            .collect();
        let (max_drawdown, max_drawdown_pct) = calculate_drawdown(&equity_curve, starting_equity);

        let returns: Vec<f64> = closed.iter().filter_map(|t| t.pnl.to_f64()).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let mean_return = mean(&returns);
        let sharpe_ratio = annualized(mean_return, sample_std(&returns));
        let sortino_ratio = annualized(mean_return, sample_std(&losses));

        let (win_rate, average_pnl) = if total_trades > 0 {
            let n = Decimal::from(total_trades);
            (
                (Decimal::from(winning_trades) / n * Decimal::ONE_HUNDRED).round_dp(2),
                (running / n).round_dp(8),
            )
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        Self {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_pnl: running,
            average_pnl,
            largest_win: closed
                .iter()
                .map(|t| t.pnl)
                .filter(|p| *p > Decimal::ZERO)
                .max()
                .unwrap_or(Decimal::ZERO),
            largest_loss: closed
                .iter()
                .map(|t| t.pnl)
                .filter(|p| *p < Decimal::ZERO)
                .min()
                .unwrap_or(Decimal::ZERO),
            cumulative_pnl,
            equity_curve,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_pct,
        }
    }

    /// Print summary in the log
    pub fn log_summary(&self, label: &str) {
        tracing::info!("=== {} ===", label);
        tracing::info!("  Trades: {} ({} won, {} lost)", self.total_trades, self.winning_trades, self.losing_trades);
        tracing::info!("  Win rate: {}%", self.win_rate);
        tracing::info!("  Total PnL: {}", self.total_pnl.round_dp(2));
        tracing::info!("  Average PnL: {}", self.average_pnl.round_dp(2));
        tracing::info!("  Largest win: {}", self.largest_win.round_dp(2));
        tracing::info!("  Largest loss: {}", self.largest_loss.round_dp(2));
        tracing::info!("  Sharpe: {:.2} | Sortino: {:.2}", self.sharpe_ratio, self.sortino_ratio);
        tracing::info!(
            "  Max drawdown: {} ({}%)",
            self.max_drawdown.round_dp(2),
            self.max_drawdown_pct.round_dp(2)
        );
    }
}

/// Largest drop from a running peak, absolute and in percent of that peak
fn calculate_drawdown(equity: &[Decimal], starting_equity: Decimal) -> (Decimal, Decimal) {
    let mut peak = starting_equity;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_pct = Decimal::ZERO;

    for value in equity {
        if *value > peak {
            peak = *value;
        }

        let drawdown = peak - *value;
        if drawdown > max_dd {
            max_dd = drawdown;
            if peak > Decimal::ZERO {
                max_dd_pct = (drawdown / peak * Decimal::ONE_HUNDRED).round_dp(4);
            }
        }
    }

    (max_dd, max_dd_pct)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with one degree of freedom; zero below two samples
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let m = mean(values);
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - m;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

fn annualized(mean_return: f64, std_dev: f64) -> f64 {
    if std_dev > 0.0 {
        mean_return / std_dev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
