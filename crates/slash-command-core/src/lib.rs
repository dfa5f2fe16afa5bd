//! Authenticated forwarding of chat-platform slash commands onto a message
//! queue.
//!
//! A request flows through [`proxy::CommandProxy::handle`]: the form body is
//! decoded, the `(team_domain, command)` pair is looked up in the
//! [`config::CommandRegistry`], the request signature is checked with that
//! registration's secret, and the normalized [`payload::InboundPayload`] is
//! handed to a [`publisher::Publisher`] under its routing key.

pub mod config;
pub mod error;
pub mod payload;
pub mod proxy;
pub mod publisher;
pub mod resolve;
pub mod signing;

pub use config::{CommandRegistration, CommandRegistry, ConfigReport};
pub use error::{ErrorClass, ProxyError};
pub use payload::{FormFields, InboundPayload, RoutingKey};
pub use proxy::{Clock, CommandProxy, InboundRequest, Outcome, ProxyOptions, Reply, SystemClock};
pub use publisher::{PublishError, Publisher};
pub use signing::{SignatureError, Verification};
