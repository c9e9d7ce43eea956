//! Configuration types for tradesim

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Initial capital must be positive
    #[error("Initial capital must be positive, got {0}")]
    InvalidCapital(Decimal),
    /// Fee or slippage rate outside [0, 1)
    #[error("Invalid {name} rate: {value} (expected 0 <= rate < 1)")]
    InvalidRate { name: &'static str, value: Decimal },
    /// Max positions must be at least one
    #[error("Max positions must be at least 1")]
    InvalidMaxPositions,
    /// Position size must be positive
    #[error("Invalid position size {size} for {mode:?} sizing")]
    InvalidPositionSize { mode: SizingMode, size: Decimal },
    /// Kelly fraction outside (0, 1]
    #[error("Kelly fraction must be in (0, 1], got {0}")]
    InvalidKellyFraction(Decimal),
    /// Stop-loss percent must be positive and below 100
    #[error("Invalid stop-loss percent: {0}")]
    InvalidStopLoss(Decimal),
    /// Take-profit percent must be positive
    #[error("Invalid take-profit percent: {0}")]
    InvalidTakeProfit(Decimal),
    /// Leverage outside [1, MAX_LEVERAGE]
    #[error("Leverage must be between 1 and {max}, got {value}")]
    InvalidLeverage { value: Decimal, max: Decimal },
    /// Minimum confidence outside [0, 1]
    #[error("Minimum confidence must be in [0, 1], got {0}")]
    InvalidConfidence(Decimal),
    /// Two strategies registered with the same id
    #[error("Strategy already registered: {0}")]
    DuplicateStrategy(String),
    /// No built-in strategy with this name
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Config file could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Upper bound accepted for the leverage multiplier
pub const MAX_LEVERAGE: Decimal = dec!(125);

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Position sizing mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// Fixed amount of capital per trade
    Fixed,
    /// Percentage of current equity per trade
    #[default]
    Percent,
    /// Fractional Kelly from the strategy's trailing trades
    Kelly,
}

impl std::str::FromStr for SizingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "percent" => Ok(Self::Percent),
            "kelly" => Ok(Self::Kelly),
            other => Err(format!("unknown sizing mode: {other}")),
        }
    }
}

/// Which level fills first when a candle touches both stop and target
///
/// OHLC bars do not carry the intrabar path, so the order is an assumption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Stop-loss executes first (conservative)
    #[default]
    StopFirst,
    /// Take-profit executes first
    TargetFirst,
}

/// Backtest run configuration, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting cash
    pub initial_capital: Decimal,
    /// Fee rate per fill (0.001 = 0.1%)
    pub fee_rate: Decimal,
    /// Adverse slippage per fill (0.0005 = 0.05%)
    pub slippage_rate: Decimal,
    /// Maximum concurrent open positions
    pub max_positions: usize,
    /// Position sizing mode
    pub position_sizing: SizingMode,
    /// Fixed: capital per trade. Percent: % of equity. Kelly: cap as % of equity.
    pub position_size: Decimal,
    /// Multiplier applied to the raw Kelly fraction
    pub kelly_fraction: Decimal,
    /// Trailing trades required before the Kelly estimate is trusted
    pub kelly_min_trades: usize,
    pub stop_loss_enabled: bool,
    /// Stop distance from entry in percent
    pub stop_loss_percent: Decimal,
    pub take_profit_enabled: bool,
    /// Target distance from entry in percent
    pub take_profit_percent: Decimal,
    /// Allow sell signals to open short positions
    pub allow_short: bool,
    /// Notional exposure multiplier; margin = notional / leverage
    pub leverage: Decimal,
    /// Signals below this confidence are skipped
    pub min_confidence: Decimal,
    /// Fill order when stop and target are both touched in one candle
    pub intrabar_policy: IntrabarPolicy,
    /// Annual risk-free rate as a fraction, used by Sharpe and Sortino
    pub risk_free_rate: f64,
    /// Close remaining positions on the last step
    pub close_at_end: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            fee_rate: dec!(0.001),
            slippage_rate: dec!(0.0005),
            max_positions: 1,
            position_sizing: SizingMode::Percent,
            position_size: dec!(10),
            kelly_fraction: dec!(0.25),
            kelly_min_trades: 5,
            stop_loss_enabled: false,
            stop_loss_percent: dec!(2),
            take_profit_enabled: false,
            take_profit_percent: dec!(5),
            allow_short: false,
            leverage: Decimal::ONE,
            min_confidence: Decimal::ZERO,
            intrabar_policy: IntrabarPolicy::StopFirst,
            risk_free_rate: 0.0,
            close_at_end: true,
        }
    }
}

impl BacktestConfig {
    /// Check every field; a run never starts with an invalid config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::InvalidCapital(self.initial_capital));
        }
        check_rate("fee", self.fee_rate)?;
        check_rate("slippage", self.slippage_rate)?;
        if self.max_positions == 0 {
            return Err(ConfigError::InvalidMaxPositions);
        }

        let size_ok = match self.position_sizing {
            SizingMode::Fixed => self.position_size > Decimal::ZERO,
            SizingMode::Percent | SizingMode::Kelly => {
                self.position_size > Decimal::ZERO && self.position_size <= dec!(100)
            }
        };
        if !size_ok {
            return Err(ConfigError::InvalidPositionSize {
                mode: self.position_sizing,
                size: self.position_size,
            });
        }

        if self.kelly_fraction <= Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            return Err(ConfigError::InvalidKellyFraction(self.kelly_fraction));
        }
        if self.stop_loss_enabled
            && (self.stop_loss_percent <= Decimal::ZERO || self.stop_loss_percent >= dec!(100))
        {
            return Err(ConfigError::InvalidStopLoss(self.stop_loss_percent));
        }
        if self.take_profit_enabled && self.take_profit_percent <= Decimal::ZERO {
            return Err(ConfigError::InvalidTakeProfit(self.take_profit_percent));
        }
        if self.leverage < Decimal::ONE || self.leverage > MAX_LEVERAGE {
            return Err(ConfigError::InvalidLeverage {
                value: self.leverage,
                max: MAX_LEVERAGE,
            });
        }
        if self.min_confidence < Decimal::ZERO || self.min_confidence > Decimal::ONE {
            return Err(ConfigError::InvalidConfidence(self.min_confidence));
        }
        Ok(())
    }
}

fn check_rate(name: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value >= Decimal::ONE {
        return Err(ConfigError::InvalidRate { name, value });
    }
    Ok(())
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
