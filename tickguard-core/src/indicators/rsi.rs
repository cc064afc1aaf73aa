/// Relative strength index with Wilder smoothing
///
/// The first `period` changes are averaged plainly; later changes are
/// smoothed with `avg = (avg·(n−1) + x)/n`. A window with no losses reads 100.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    gain_sum: f64,
    loss_sum: f64,
    changes: usize,
    value: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            changes: 0,
            value: None,
        }
    }

    /// Feed one close; `None` until `period + 1` closes have been seen
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if !close.is_finite() {
            return self.value;
        }
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes += 1;

        let n = self.period as f64;
        if self.changes < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        } else if self.changes == self.period {
            self.avg_gain = (self.gain_sum + gain) / n;
            self.avg_loss = (self.loss_sum + loss) / n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        let value = if self.avg_loss == 0.0 {
            100.0
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        self.value = Some(value);
        self.value
    }
}

/// RSI over a close series, `None` with fewer than `period + 1` closes
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    let mut indicator = Rsi::new(period);
    closes.iter().fold(None, |_, close| indicator.update(*close))
}
