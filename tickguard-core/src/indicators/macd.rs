use super::ema::Ema;

/// MACD line, signal line and histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct Macd {
    ema_fast: Ema,
    ema_slow: Ema,
    ema_signal: Ema,
    warmup: usize,
    count: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            ema_fast: Ema::new(fast),
            ema_slow: Ema::new(slow),
            ema_signal: Ema::new(signal),
            warmup: min_bars(slow, signal),
            count: 0,
        }
    }

    /// Feed one close; `None` until the slow and signal averages are warm
    pub fn update(&mut self, close: f64) -> Option<MacdValue> {
        let fast = self.ema_fast.update(close);
        let slow = self.ema_slow.update(close);
        let macd = fast - slow;
        let signal = self.ema_signal.update(macd);
        self.count += 1;

        (self.count >= self.warmup).then_some(MacdValue {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

/// Closes required before MACD is reported
pub fn min_bars(slow: usize, signal: usize) -> usize {
    slow + signal
}

/// MACD over a close series
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdValue> {
    let mut indicator = Macd::new(fast, slow, signal);
    closes.iter().fold(None, |_, close| indicator.update(*close))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::ema::ema_series;
    use approx::assert_relative_eq;

    #[test]
    fn test_needs_slow_plus_signal_bars() {
        let closes: Vec<f64> = (0..34).map(|i| 10.0 + 0.1 * i as f64).collect();
        assert!(macd(&closes, 12, 26, 9).is_none());

        let closes: Vec<f64> = (0..35).map(|i| 10.0 + 0.1 * i as f64).collect();
        assert!(macd(&closes, 12, 26, 9).is_some());
    }

    #[test]
    fn test_matches_ema_composition() {
        let closes: Vec<f64> = (0..60).map(|i| 10.0 + ((i as f64) * 0.3).sin()).collect();
        let fast = ema_series(&closes, 12);
        let slow = ema_series(&closes, 26);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_series(&line, 9);

        let value = macd(&closes, 12, 26, 9).unwrap();
        assert_relative_eq!(value.macd, line[59], epsilon = 1e-12);
        assert_relative_eq!(value.signal, signal[59], epsilon = 1e-12);
        assert_relative_eq!(value.histogram, line[59] - signal[59], epsilon = 1e-12);
    }

    #[test]
    fn test_uptrend_has_positive_line() {
        let closes: Vec<f64> = (0..80).map(|i| 10.0 * 1.01f64.powi(i)).collect();
        let value = macd(&closes, 12, 26, 9).unwrap();
        assert!(value.macd > 0.0);
    }
}
