//! Ingress gateway library: HTTP sources that turn inbound requests into
//! messages for application code, and transmit gateways that send replies
//! or outbound requests with durable redelivery.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod source;

pub use config::{load_config, GatewayConfig, SourceConfig};
pub use http::Reply;
pub use lifecycle::{Gateway, GatewayBuilder, Shutdown, StartupError};
pub use message::{Confirmation, Message};
pub use routing::{EndpointRegistry, EndpointRouter, HandlerError};
pub use source::{Callbacks, Transmission, TransmitOptions, Transmitter};
