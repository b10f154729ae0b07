//! Binance raw market streams.
//!
//! Each cache holds one connection to `<base>/<stream name>`; events arrive as
//! JSON text frames and are parsed into [`StreamEvent`].

mod client;
pub mod messages;
mod stream;

pub use client::{MarketWsClient, WsConfig, WsConfigBuilder};
pub use messages::StreamEvent;
pub use stream::MarketStream;
