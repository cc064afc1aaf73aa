/// Exponential moving average, seeded with the first observation
///
/// `value = α·price + (1−α)·prev` with `α = 2/(period+1)`.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
    period: usize,
    count: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: 0.0,
            period,
            count: 0,
        }
    }

    /// Feed one value, return the current average
    pub fn update(&mut self, price: f64) -> f64 {
        if self.count == 0 {
            self.value = price;
        } else {
            self.value = self.alpha * price + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// True once `period` values have been seen
    pub fn is_warm(&self) -> bool {
        self.count >= self.period
    }
}

/// EMA of every prefix of `values`
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = Ema::new(period);
    values.iter().map(|v| ema.update(*v)).collect()
}
