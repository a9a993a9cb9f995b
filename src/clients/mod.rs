// Exchange port and its implementations

pub mod exchange;
pub mod kucoin;
pub mod paper;

// Re-export client types
pub use exchange::{ExchangeError, ExchangeOrder, ExchangePort, LimitOrder, OrderState, Side};
pub use kucoin::KucoinClient;
pub use paper::PaperExchange;
