//! HTTP exchanges
//!
//! Request/response values and the observable [`HttpExchange`].

mod exchange;
mod message;

pub use exchange::{HttpExchange, HttpExchangeConfig};
pub use message::{HttpRequest, HttpResponse};
