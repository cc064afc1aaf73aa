//! Market data quality
//!
//! - `quote_window`: recent quotes per symbol
//! - `validator`: trade classification against those quotes
//! - `price_book`: validated latest price and day high per symbol

pub mod price_book;
pub mod quote_window;
pub mod validator;

pub use price_book::{PriceBook, PriceState};
pub use quote_window::QuoteWindow;
pub use validator::{
    classify, PriceBandMode, RejectReason, TradeValidator, ValidationConfig, Verdict,
};
