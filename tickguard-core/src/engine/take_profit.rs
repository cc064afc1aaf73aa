//! Take-profit gates for an open position
//!
//! Three independent gates are evaluated every tick. When more than one fires
//! on the same tick a full-size exit beats a half-size one, and otherwise the
//! gate order below decides:
//!
//! - **Trailing**: once the day high has run `runner_multiple` above the
//!   entry, a retreat to `day_high * (1 - trailing_stop%)` fires. After
//!   firing the gate stays disarmed until price trades back above the line.
//! - **MACD**: the histogram/signal ratio crossing the partial (full)
//!   threshold arms a half-size (full-size) trail on the ratio itself, which
//!   fires once the ratio gives back `macd_retrace` of its peak.
//! - **VWAP extension** (optional): on each new bar, a close far enough above
//!   the session VWAP fires.

use crate::core::Bar;
use crate::indicators::IndicatorSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Absolute slack for price comparisons
pub const PRICE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeProfitPolicy {
    /// Day high / entry price that arms the trailing gate
    pub runner_multiple: f64,
    /// Day high / entry price past which the trailing gate closes everything
    pub full_runner_multiple: Option<f64>,
    /// Histogram/signal ratio (%) arming a half-size MACD trail
    pub macd_partial_threshold: f64,
    /// Histogram/signal ratio (%) arming a full-size MACD trail
    pub macd_full_threshold: f64,
    /// Fraction of the ratio peak given back before the MACD trail fires
    pub macd_retrace: f64,
    /// Close above VWAP (fraction) firing a half exit
    pub vwap_partial_ext: Option<f64>,
    /// Close above VWAP (fraction) firing a full exit
    pub vwap_full_ext: Option<f64>,
}

impl Default for TakeProfitPolicy {
    fn default() -> Self {
        Self {
            runner_multiple: 1.15,
            full_runner_multiple: None,
            macd_partial_threshold: 150.0,
            macd_full_threshold: 200.0,
            macd_retrace: 0.20,
            vwap_partial_ext: None,
            vwap_full_ext: None,
        }
    }
}

impl TakeProfitPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.runner_multiple <= 1.0 {
            return Err(format!(
                "runner_multiple must be above 1.0, got {}",
                self.runner_multiple
            ));
        }
        if let Some(full) = self.full_runner_multiple {
            if full < self.runner_multiple {
                return Err(format!(
                    "full_runner_multiple {} is below runner_multiple {}",
                    full, self.runner_multiple
                ));
            }
        }
        if self.macd_full_threshold < self.macd_partial_threshold {
            return Err("macd_full_threshold must be >= macd_partial_threshold".to_string());
        }
        if !(self.macd_retrace > 0.0 && self.macd_retrace < 1.0) {
            return Err(format!("macd_retrace must be within (0, 1), got {}", self.macd_retrace));
        }
        if let (Some(partial), Some(full)) = (self.vwap_partial_ext, self.vwap_full_ext) {
            if full < partial {
                return Err("vwap_full_ext must be >= vwap_partial_ext".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Trailing,
    Macd,
    VwapExtension,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Trailing => "trailing",
            Gate::Macd => "macd",
            Gate::VwapExtension => "vwap_extension",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSize {
    Half,
    Remainder,
}

/// Market view for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct TakeProfitInput<'a> {
    pub price: f64,
    pub day_high: f64,
    pub entry_price: f64,
    pub trailing_stop_percentage: f64,
    pub indicators: &'a IndicatorSnapshot,
    pub last_bar: Option<&'a Bar>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MacdTrail {
    size: ExitSize,
    peak: f64,
}

/// Per-position gate state
#[derive(Debug, Clone)]
pub struct TakeProfitTracker {
    trail_armed: bool,
    macd_trail: Option<MacdTrail>,
    last_macd_bar: Option<DateTime<Utc>>,
    last_vwap_bar: Option<DateTime<Utc>>,
}

impl Default for TakeProfitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TakeProfitTracker {
    pub fn new() -> Self {
        Self {
            trail_armed: true,
            macd_trail: None,
            last_macd_bar: None,
            last_vwap_bar: None,
        }
    }

    pub fn trail_armed(&self) -> bool {
        self.trail_armed
    }

    /// Evaluate every gate, returning the largest exit that fired
    ///
    /// Every gate updates its state on each call, so a fired gate is consumed
    /// even when another one wins. Picking the largest size keeps that from
    /// losing a full exit.
    pub fn evaluate(
        &mut self,
        policy: &TakeProfitPolicy,
        input: &TakeProfitInput<'_>,
    ) -> Option<(Gate, ExitSize)> {
        let fired = [
            self.trailing(policy, input).map(|size| (Gate::Trailing, size)),
            self.macd(policy, input).map(|size| (Gate::Macd, size)),
            self.vwap(policy, input).map(|size| (Gate::VwapExtension, size)),
        ];
        let mut fired = fired.into_iter().flatten();
        let first = fired.next()?;
        if first.1 == ExitSize::Remainder {
            return Some(first);
        }
        Some(
            fired
                .find(|(_, size)| *size == ExitSize::Remainder)
                .unwrap_or(first),
        )
    }

    fn trailing(&mut self, policy: &TakeProfitPolicy, input: &TakeProfitInput<'_>) -> Option<ExitSize> {
        let trail_line = input.day_high * (100.0 - input.trailing_stop_percentage) / 100.0;

        if input.price > trail_line + PRICE_EPSILON {
            self.trail_armed = true;
            return None;
        }
        if !self.trail_armed {
            return None;
        }

        let runner = input.day_high + PRICE_EPSILON >= input.entry_price * policy.runner_multiple;
        if !runner {
            return None;
        }

        self.trail_armed = false;
        let full_runner = policy
            .full_runner_multiple
            .is_some_and(|m| input.day_high + PRICE_EPSILON >= input.entry_price * m);
        Some(if full_runner {
            ExitSize::Remainder
        } else {
            ExitSize::Half
        })
    }

    fn macd(&mut self, policy: &TakeProfitPolicy, input: &TakeProfitInput<'_>) -> Option<ExitSize> {
        let snapshot = input.indicators;
        if !snapshot.macd_ready() {
            return None;
        }
        let bar_ts = input.last_bar.map(|bar| bar.timestamp);
        if bar_ts.is_some() && bar_ts == self.last_macd_bar {
            return None;
        }
        self.last_macd_bar = bar_ts;

        let ratio = snapshot.macd_hist / snapshot.macd_signal * 100.0;
        if !ratio.is_finite() {
            return None;
        }

        if ratio >= policy.macd_full_threshold {
            let peak = self.macd_trail.map_or(ratio, |trail| trail.peak.max(ratio));
            self.macd_trail = Some(MacdTrail {
                size: ExitSize::Remainder,
                peak,
            });
        } else if ratio >= policy.macd_partial_threshold && self.macd_trail.is_none() {
            self.macd_trail = Some(MacdTrail {
                size: ExitSize::Half,
                peak: ratio,
            });
        }

        let trail = self.macd_trail.as_mut()?;
        trail.peak = trail.peak.max(ratio);
        if ratio <= trail.peak * (1.0 - policy.macd_retrace) {
            let size = trail.size;
            self.macd_trail = None;
            return Some(size);
        }
        None
    }

    fn vwap(&mut self, policy: &TakeProfitPolicy, input: &TakeProfitInput<'_>) -> Option<ExitSize> {
        if policy.vwap_partial_ext.is_none() && policy.vwap_full_ext.is_none() {
            return None;
        }
        let bar = input.last_bar?;
        if self.last_vwap_bar == Some(bar.timestamp) {
            return None;
        }
        self.last_vwap_bar = Some(bar.timestamp);

        let vwap = input.indicators.session_vwap;
        if vwap <= 0.0 {
            return None;
        }
        if policy
            .vwap_full_ext
            .is_some_and(|ext| bar.close + PRICE_EPSILON >= vwap * (1.0 + ext))
        {
            return Some(ExitSize::Remainder);
        }
        if policy
            .vwap_partial_ext
            .is_some_and(|ext| bar.close + PRICE_EPSILON >= vwap * (1.0 + ext))
        {
            return Some(ExitSize::Half);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn input<'a>(price: f64, day_high: f64, snapshot: &'a IndicatorSnapshot) -> TakeProfitInput<'a> {
        TakeProfitInput {
            price,
            day_high,
            entry_price: 5.00,
            trailing_stop_percentage: 5.0,
            indicators: snapshot,
            last_bar: None,
        }
    }

    #[test]
    fn test_trailing_fires_after_runner() {
        let snapshot = IndicatorSnapshot::default();
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();

        assert_eq!(tracker.evaluate(&policy, &input(6.00, 6.00, &snapshot)), None);
        assert_eq!(
            tracker.evaluate(&policy, &input(5.70, 6.00, &snapshot)),
            Some((Gate::Trailing, ExitSize::Half))
        );
    }

    #[test]
    fn test_trailing_needs_runner() {
        let snapshot = IndicatorSnapshot::default();
        let mut tracker = TakeProfitTracker::new();
        // 5.50 < 5.00 * 1.15
        assert_eq!(
            tracker.evaluate(&TakeProfitPolicy::default(), &input(5.20, 5.50, &snapshot)),
            None
        );
    }

    #[test]
    fn test_trailing_rearms_above_line() {
        let snapshot = IndicatorSnapshot::default();
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();

        assert!(tracker.evaluate(&policy, &input(5.70, 6.00, &snapshot)).is_some());
        assert!(!tracker.trail_armed());
        assert_eq!(tracker.evaluate(&policy, &input(5.60, 6.00, &snapshot)), None);

        assert_eq!(tracker.evaluate(&policy, &input(5.90, 6.00, &snapshot)), None);
        assert!(tracker.trail_armed());
        assert!(tracker.evaluate(&policy, &input(5.65, 6.00, &snapshot)).is_some());
    }

    #[test]
    fn test_full_runner_closes_everything() {
        let snapshot = IndicatorSnapshot::default();
        let policy = TakeProfitPolicy {
            full_runner_multiple: Some(1.5),
            ..TakeProfitPolicy::default()
        };
        let mut tracker = TakeProfitTracker::new();
        assert_eq!(
            tracker.evaluate(&policy, &input(7.10, 7.50, &snapshot)),
            Some((Gate::Trailing, ExitSize::Remainder))
        );
    }

    fn macd_snapshot(ratio: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            macd_signal: 0.1,
            macd_hist: 0.1 * ratio / 100.0,
            macd: 0.1 + 0.1 * ratio / 100.0,
            bar_count: 60,
            ..IndicatorSnapshot::default()
        }
    }

    fn bar(i: i64) -> Bar {
        Bar::flat(5.2, 100.0, Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap() + Duration::minutes(i))
    }

    #[test]
    fn test_macd_trail_fires_on_retrace() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();
        let mut run = |ratio: f64, i: i64| {
            let snapshot = macd_snapshot(ratio);
            let bar = bar(i);
            let mut inp = input(5.2, 5.2, &snapshot);
            inp.last_bar = Some(&bar);
            tracker.evaluate(&policy, &inp)
        };

        assert_eq!(run(100.0, 0), None);
        assert_eq!(run(160.0, 1), None);
        assert_eq!(run(180.0, 2), None);
        // 180 * 0.8 = 144
        assert_eq!(run(140.0, 3), Some((Gate::Macd, ExitSize::Half)));
    }

    #[test]
    fn test_macd_full_threshold_upgrades_trail() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();
        let mut run = |ratio: f64, i: i64| {
            let snapshot = macd_snapshot(ratio);
            let bar = bar(i);
            let mut inp = input(5.2, 5.2, &snapshot);
            inp.last_bar = Some(&bar);
            tracker.evaluate(&policy, &inp)
        };

        assert_eq!(run(160.0, 0), None);
        assert_eq!(run(250.0, 1), None);
        assert_eq!(run(190.0, 2), Some((Gate::Macd, ExitSize::Remainder)));
    }

    #[test]
    fn test_full_macd_exit_beats_half_trailing_on_same_tick() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();

        let snapshot = macd_snapshot(250.0);
        let b = bar(0);
        let mut inp = input(12.0, 12.0, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(tracker.evaluate(&policy, &inp), None);

        // Ratio retraced from 250 and price under the 11.40 trail line
        let snapshot = macd_snapshot(100.0);
        let b = bar(1);
        let mut inp = input(11.0, 12.0, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(
            tracker.evaluate(&policy, &inp),
            Some((Gate::Macd, ExitSize::Remainder))
        );
    }

    #[test]
    fn test_half_exits_keep_gate_order() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();

        let snapshot = macd_snapshot(180.0);
        let b = bar(0);
        let mut inp = input(6.0, 6.0, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(tracker.evaluate(&policy, &inp), None);

        let snapshot = macd_snapshot(100.0);
        let b = bar(1);
        let mut inp = input(5.70, 6.0, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(
            tracker.evaluate(&policy, &inp),
            Some((Gate::Trailing, ExitSize::Half))
        );
    }

    #[test]
    fn test_macd_ignores_repeat_bar() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();
        let snapshot = macd_snapshot(160.0);
        let b = bar(0);
        let mut inp = input(5.2, 5.2, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(tracker.evaluate(&policy, &inp), None);

        // Same bar, lower ratio: not re-evaluated
        let snapshot = macd_snapshot(100.0);
        let mut inp = input(5.2, 5.2, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(tracker.evaluate(&policy, &inp), None);
    }

    #[test]
    fn test_vwap_gate_off_by_default() {
        let policy = TakeProfitPolicy::default();
        let mut tracker = TakeProfitTracker::new();
        let snapshot = IndicatorSnapshot {
            session_vwap: 4.0,
            ..IndicatorSnapshot::default()
        };
        let b = bar(0);
        let mut inp = input(5.2, 5.2, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(tracker.evaluate(&policy, &inp), None);
    }

    #[test]
    fn test_vwap_gate_sizes() {
        let policy = TakeProfitPolicy {
            vwap_partial_ext: Some(0.125),
            vwap_full_ext: Some(0.15),
            ..TakeProfitPolicy::default()
        };
        let mut tracker = TakeProfitTracker::new();

        // close 5.2 vs vwap 4.6: +13%
        let snapshot = IndicatorSnapshot {
            session_vwap: 4.6,
            ..IndicatorSnapshot::default()
        };
        let b = bar(0);
        let mut inp = input(5.2, 5.2, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(
            tracker.evaluate(&policy, &inp),
            Some((Gate::VwapExtension, ExitSize::Half))
        );
        // Same bar does not fire twice
        assert_eq!(tracker.evaluate(&policy, &inp), None);

        // close 5.2 vs vwap 4.5: +15.6%
        let snapshot = IndicatorSnapshot {
            session_vwap: 4.5,
            ..IndicatorSnapshot::default()
        };
        let b = bar(1);
        let mut inp = input(5.2, 5.2, &snapshot);
        inp.last_bar = Some(&b);
        assert_eq!(
            tracker.evaluate(&policy, &inp),
            Some((Gate::VwapExtension, ExitSize::Remainder))
        );
    }

    #[test]
    fn test_policy_validation() {
        assert!(TakeProfitPolicy::default().validate().is_ok());
        let bad = TakeProfitPolicy {
            macd_retrace: 1.5,
            ..TakeProfitPolicy::default()
        };
        assert!(bad.validate().is_err());
    }
}
