//! Broker Adapter
//!
//! REST implementation of `BrokerClient`: form-encoded requests, JSON
//! envelope responses, token authorization.

mod api_types;
mod http_client;

pub use http_client::HttpBrokerClient;
