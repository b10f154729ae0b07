//! The HTTP side of the proxy.
//!
//! A [`Dispatcher`] per market class inspects each request: the four cached
//! endpoints are answered from memory, anything else goes to the
//! [`PassthroughProxy`].

pub mod dispatcher;
pub mod passthrough;
pub mod routes;

pub use dispatcher::Dispatcher;
pub use passthrough::PassthroughProxy;
pub use routes::{Route, route};
