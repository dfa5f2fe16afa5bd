//! Request orchestration: method gate, form decoding, command resolution,
//! signature verification, content validation and publishing.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::CommandRegistry;
use crate::error::ProxyError;
use crate::payload::{FormFields, InboundPayload, RoutingKey, normalize};
use crate::publisher::Publisher;
use crate::signing::{self, Verification};

pub const DEFAULT_ACK_TEXT: &str = "Command received.";
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 10_000;

/// Wall-clock source used for replay-window checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyOptions {
    /// Answer GET with an empty 200 instead of 405.
    pub allow_get: bool,
    /// Honour a trailing `trace` word in the command text by echoing the
    /// published payload back to the caller.
    pub trace_echo: bool,
    pub ack_text: String,
    pub publish_timeout_ms: u64,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            allow_get: true,
            trace_echo: false,
            ack_text: DEFAULT_ACK_TEXT.to_string(),
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

impl ProxyOptions {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// What the transport hands over for one webhook call.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// JSON reply shown to the invoking user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub response_type: String,
    pub text: String,
}

impl Reply {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// GET health probe; answered with an empty body.
    Health,
    Accepted { routing_key: RoutingKey, reply: Reply },
}

/// Process-wide context shared by every request: the registered commands,
/// the outbound publisher and the clock.
pub struct CommandProxy {
    registry: Arc<CommandRegistry>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    options: ProxyOptions,
}

impl CommandProxy {
    pub fn new(
        registry: Arc<CommandRegistry>,
        publisher: Arc<dyn Publisher>,
        options: ProxyOptions,
    ) -> Self {
        Self::with_clock(registry, publisher, Arc::new(SystemClock), options)
    }

    pub fn with_clock(
        registry: Arc<CommandRegistry>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            registry,
            publisher,
            clock,
            options,
        }
    }

    /// Handles one webhook call. Every failure is returned as a
    /// [`ProxyError`]; nothing here aborts the process.
    pub async fn handle(&self, request: InboundRequest) -> Result<Outcome, ProxyError> {
        let span = info_span!(
            "slash_command",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            body_len = request.body.len(),
        );
        let result = self.process(request).instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(Outcome::Health) => debug!("health probe answered"),
            Ok(Outcome::Accepted { routing_key, .. }) => {
                info!(routing_key = %routing_key, "command forwarded")
            }
            Err(err) => warn!(
                error = %err,
                class = err.class().as_str(),
                status = err.status().as_u16(),
                retryable = err.is_retryable(),
                "command rejected"
            ),
        });
        result
    }

    async fn process(&self, request: InboundRequest) -> Result<Outcome, ProxyError> {
        let received_at = self.clock.now();

        if request.method == Method::GET && self.options.allow_get {
            return Ok(Outcome::Health);
        }
        if request.method != Method::POST {
            return Err(ProxyError::MethodNotAllowed(request.method));
        }

        let fields = FormFields::parse(&request.body)?;
        let mut payload = normalize(&fields);

        let registration = self
            .registry
            .resolve(&payload.team_domain, &payload.command)?;
        debug!(
            team_domain = %registration.team_domain,
            command = %registration.command,
            "command resolved"
        );

        let verification = signing::verify(
            &request.headers,
            &request.body,
            registration.signing_secret.as_bytes(),
            received_at.timestamp(),
        );
        if let Verification::Invalid(source) | Verification::Expired(source) = verification {
            return Err(ProxyError::Auth {
                team_domain: registration.team_domain.clone(),
                command: registration.command.clone(),
                source,
            });
        }

        if !fields.contains_key("text") {
            return Err(ProxyError::MissingText {
                team_domain: payload.team_domain.clone(),
                command: payload.command.clone(),
            });
        }

        let trace = self.options.trace_echo && payload.requests_trace();
        let received_at = received_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        if trace {
            payload.trace = Some(received_at.clone());
        }

        let routing_key = payload.routing_key();
        self.publish(&routing_key, &payload).await?;

        let text = if trace {
            render_trace(&received_at, &payload)?
        } else {
            self.options.ack_text.clone()
        };
        Ok(Outcome::Accepted {
            routing_key,
            reply: Reply::ephemeral(text),
        })
    }

    async fn publish(
        &self,
        routing_key: &RoutingKey,
        payload: &InboundPayload,
    ) -> Result<(), ProxyError> {
        let bytes = Bytes::from(payload.to_bytes()?);
        let timeout = self.options.publish_timeout();
        match tokio::time::timeout(timeout, self.publisher.publish(routing_key, bytes)).await {
            Ok(result) => result.map_err(ProxyError::from),
            Err(_) => Err(ProxyError::PublishTimeout {
                routing_key: routing_key.to_string(),
                timeout_ms: self.options.publish_timeout_ms,
            }),
        }
    }
}

fn render_trace(received_at: &str, payload: &InboundPayload) -> Result<String, ProxyError> {
    let pretty = serde_json::to_string_pretty(payload)?;
    Ok(format!(
        "Slack Command Proxy TRACE:\nRequest received at: {received_at}\nPayload: {pretty}"
    ))
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A clock frozen at one instant.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}
