use crate::core::{QuoteEntry, RingBuffer};
use chrono::{DateTime, Utc};

/// Default quotes retained per symbol
pub const DEFAULT_QUOTE_WINDOW: usize = 500;

/// Sliding window of the most recent quotes for one symbol
#[derive(Debug, Clone)]
pub struct QuoteWindow {
    quotes: RingBuffer<QuoteEntry>,
}

impl Default for QuoteWindow {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_WINDOW)
    }
}

impl QuoteWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            quotes: RingBuffer::new(capacity),
        }
    }

    pub fn from_quotes(capacity: usize, quotes: impl IntoIterator<Item = QuoteEntry>) -> Self {
        let mut window = Self::new(capacity);
        for quote in quotes {
            window.push(quote);
        }
        window
    }

    pub fn push(&mut self, quote: QuoteEntry) {
        self.quotes.push(quote);
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn latest(&self) -> Option<&QuoteEntry> {
        self.quotes.latest()
    }

    /// Quote whose timestamp is nearest to `ts`, with the absolute gap
    ///
    /// Ties go to the most recent quote.
    pub fn closest(&self, ts: DateTime<Utc>) -> Option<(&QuoteEntry, chrono::Duration)> {
        self.quotes
            .iter()
            .rev()
            .map(|quote| (quote, abs_delta(quote.timestamp, ts)))
            .min_by_key(|(_, delta)| *delta)
    }
}

fn abs_delta(a: DateTime<Utc>, b: DateTime<Utc>) -> chrono::Duration {
    let delta = a - b;
    if delta < chrono::Duration::zero() {
        -delta
    } else {
        delta
    }
}
