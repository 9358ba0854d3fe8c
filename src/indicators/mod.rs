//! Pure technical-indicator engine.
//!
//! Deterministic transforms over an OHLCV series; no I/O and no state
//! across calls. Warm-up semantics follow rolling-window conventions:
//! SMA/Bollinger need a full window, EMA is recursive from the first
//! point with alpha = 2 / (n + 1), RSI uses simple rolling means of
//! gains and losses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::types::Candle;

pub const RSI_PERIOD: usize = 14;
pub const SMA_PERIOD: usize = 20;
pub const EMA_PERIOD: usize = 20;
pub const BOLLINGER_PERIOD: usize = 20;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Points required before every indicator has left its warm-up window.
pub const MIN_POINTS: usize = MACD_SLOW + MACD_SIGNAL;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("insufficient data: need {required} points, got {got}")]
    InsufficientData { required: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Overbought,
    Oversold,
    Neutral,
}

impl Signal {
    fn is_bullish(self) -> bool {
        matches!(self, Signal::Buy | Signal::Oversold)
    }

    fn is_bearish(self) -> bool {
        matches!(self, Signal::Sell | Signal::Overbought)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signals {
    pub rsi: Signal,
    pub macd: Signal,
    pub bollinger: Signal,
    pub global: Signal,
}

/// Immutable indicator values for one symbol at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub ts_ms: u64,

    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub sma_20: f64,
    pub ema_20: f64,

    pub signals: Signals,
}

/// Simple moving average over the trailing `period` points.
/// Returns one value per fully covered window, aligned to the series tail.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return Vec::new();
    }
    data.windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average, recursive from the first point.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if data.is_empty() || period == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    out.push(prev);
    for &x in &data[1..] {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Relative Strength Index over the trailing `period` deltas.
/// Flat windows (no gains, no losses) read as neutral 50.
pub fn rsi(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period + 1 {
        return None;
    }

    let window = &data[data.len() - period - 1..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line (fast EMA − slow EMA) and its signal line, full length.
pub fn macd(data: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let fast = ema(data, MACD_FAST);
    let slow = ema(data, MACD_SLOW);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, MACD_SIGNAL);
    (line, signal)
}

/// Bollinger bands: SMA ± k sample standard deviations over the last window.
pub fn bollinger(data: &[f64], period: usize, k: f64) -> Option<(f64, f64, f64)> {
    if period < 2 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let std = var.sqrt();
    Some((mean + k * std, mean, mean - k * std))
}

/// Computes the full indicator set plus trading signals for a series.
pub fn compute(symbol: &str, candles: &[Candle]) -> Result<IndicatorSnapshot, IndicatorError> {
    if candles.len() < MIN_POINTS {
        return Err(IndicatorError::InsufficientData {
            required: MIN_POINTS,
            got: candles.len(),
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = *closes.last().unwrap_or(&0.0);
    let ts_ms = candles.last().map(|c| c.ts_ms).unwrap_or(0);

    // MIN_POINTS guarantees every window below is covered.
    let rsi_value = rsi(&closes, RSI_PERIOD).unwrap_or(50.0);
    let (macd_line, signal_line) = macd(&closes);
    let macd_value = *macd_line.last().unwrap_or(&0.0);
    let macd_signal_value = *signal_line.last().unwrap_or(&0.0);
    let (bb_upper, bb_middle, bb_lower) =
        bollinger(&closes, BOLLINGER_PERIOD, 2.0).unwrap_or((0.0, 0.0, 0.0));
    let sma_20 = *sma(&closes, SMA_PERIOD).last().unwrap_or(&0.0);
    let ema_20 = *ema(&closes, EMA_PERIOD).last().unwrap_or(&0.0);

    let rsi_signal = if rsi_value < 30.0 {
        Signal::Oversold
    } else if rsi_value > 70.0 {
        Signal::Overbought
    } else {
        Signal::Neutral
    };

    let macd_signal = if macd_value > macd_signal_value {
        Signal::Buy
    } else {
        Signal::Sell
    };

    let bollinger_signal = if last_close > bb_upper {
        Signal::Overbought
    } else if last_close < bb_lower {
        Signal::Oversold
    } else {
        Signal::Neutral
    };

    let votes = [rsi_signal, macd_signal, bollinger_signal];
    let bullish = votes.iter().filter(|s| s.is_bullish()).count();
    let bearish = votes.iter().filter(|s| s.is_bearish()).count();
    let global = if bullish > bearish {
        Signal::Buy
    } else if bearish > bullish {
        Signal::Sell
    } else {
        Signal::Neutral
    };

    Ok(IndicatorSnapshot {
        symbol: symbol.to_string(),
        ts_ms,
        rsi: rsi_value,
        macd: macd_value,
        macd_signal: macd_signal_value,
        macd_hist: macd_value - macd_signal_value,
        bb_upper,
        bb_middle,
        bb_lower,
        sma_20,
        ema_20,
        signals: Signals {
            rsi: rsi_signal,
            macd: macd_signal,
            bollinger: bollinger_signal,
            global,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                ts_ms: 1_700_000_000_000 + i as u64 * 60_000,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
                turnover: close * 10.0,
            })
            .collect()
    }

    #[test]
    fn sma_of_constant_series_is_constant() {
        let data = vec![5.0; 30];
        let out = sma(&data, 20);
        assert_eq!(out.len(), 11);
        assert!(out.iter().all(|v| (v - 5.0).abs() < 1e-12));
    }

    #[test]
    fn sma_trailing_window() {
        let data: Vec<f64> = (1..=5).map(f64::from).collect();
        let out = sma(&data, 3);
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_tracks_series_direction() {
        let data: Vec<f64> = (1..=50).map(f64::from).collect();
        let out = ema(&data, 20);
        assert_eq!(out.len(), 50);
        assert_eq!(out[0], 1.0);
        // EMA lags but must stay monotone on a monotone series.
        assert!(out.windows(2).all(|w| w[1] > w[0]));
        assert!(*out.last().unwrap() < 50.0);
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (1..=20).map(f64::from).collect();
        assert!((rsi(&rising, 14).unwrap() - 100.0).abs() < 1e-9);

        let falling: Vec<f64> = (1..=20).rev().map(f64::from).collect();
        assert!(rsi(&falling, 14).unwrap() < 1e-9);

        let flat = vec![3.0; 20];
        assert!((rsi(&flat, 14).unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_needs_period_plus_one_points() {
        let data = vec![1.0; 14];
        assert!(rsi(&data, 14).is_none());
    }

    #[test]
    fn bollinger_bands_are_symmetric_around_sma() {
        let data: Vec<f64> = (1..=40).map(f64::from).collect();
        let (upper, middle, lower) = bollinger(&data, 20, 2.0).unwrap();
        assert!((upper + lower - 2.0 * middle).abs() < 1e-9);
        assert!(upper > middle && middle > lower);
        // SMA of 21..=40 is 30.5.
        assert!((middle - 30.5).abs() < 1e-9);
    }

    #[test]
    fn compute_rejects_short_series() {
        let candles = candles_from_closes(&[1.0; 10]);
        match compute("BTCUSDT", &candles) {
            Err(IndicatorError::InsufficientData { required, got }) => {
                assert_eq!(required, MIN_POINTS);
                assert_eq!(got, 10);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn strong_uptrend_produces_bearish_overbought_rsi_but_macd_buy() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let snap = compute("BTCUSDT", &candles_from_closes(&closes)).unwrap();
        assert_eq!(snap.signals.rsi, Signal::Overbought);
        assert_eq!(snap.signals.macd, Signal::Buy);
        assert!(snap.macd > 0.0);
        assert!((snap.macd_hist - (snap.macd - snap.macd_signal)).abs() < 1e-12);
    }

    #[test]
    fn downtrend_votes_cancel_to_neutral() {
        // Oversold RSI counts as a bullish vote and cancels the MACD sell.
        let closes: Vec<f64> = (1..=60).rev().map(f64::from).collect();
        let snap = compute("ETHUSDT", &candles_from_closes(&closes)).unwrap();
        assert_eq!(snap.signals.rsi, Signal::Oversold);
        assert_eq!(snap.signals.macd, Signal::Sell);
        assert_eq!(snap.signals.global, Signal::Neutral);
    }

    proptest! {
        #[test]
        fn rsi_is_bounded(closes in proptest::collection::vec(0.01f64..1e6, 15..120)) {
            if let Some(v) = rsi(&closes, RSI_PERIOD) {
                prop_assert!((0.0..=100.0).contains(&v));
            }
        }

        #[test]
        fn ema_stays_within_series_range(closes in proptest::collection::vec(0.01f64..1e6, 1..120)) {
            let lo = closes.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for v in ema(&closes, EMA_PERIOD) {
                prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
            }
        }
    }
}
