//! The outbound relay capability. The delivery loop only ever sees the
//! `Relay` / `RelayConnector` traits; lettre lives behind them.

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounce;

/// Per-campaign relay credentials, supplied at start/resume time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelayReceipt {
    /// Whatever the relay returned for the accepted message.
    pub server_response: String,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RelayError {
    pub message: String,
    /// SMTP-style reply code when the relay surfaced one.
    pub code: Option<u16>,
}

impl RelayError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = bounce::extract_smtp_code(&message);
        RelayError { message, code }
    }
}

#[async_trait]
pub trait Relay: Send + Sync {
    /// Cheap connectivity probe; must succeed before a campaign may start.
    async fn verify(&self) -> Result<(), RelayError>;
    async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError>;
}

/// Builds a relay from credentials. The delivery loop resolves credentials
/// only after it holds the lease, so construction is deferred behind this.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, config: &RelayConfig) -> Result<Box<dyn Relay>, RelayError>;
}

pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let tls_params = TlsParameters::new(config.host.clone())
            .map_err(|e| RelayError::new(format!("tls setup failed: {e}")))?;
        // 465 is implicit TLS; everything else negotiates STARTTLS.
        let tls = if config.port == 465 {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Required(tls_params)
        };
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| RelayError::new(format!("relay setup failed: {e}")))?
            .port(config.port)
            .credentials(creds)
            .tls(tls)
            .build();
        Ok(SmtpRelay { transport })
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn verify(&self) -> Result<(), RelayError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RelayError::new("relay refused the connection probe")),
            Err(e) => Err(RelayError::new(e.to_string())),
        }
    }

    async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError> {
        let email = build_message(message)?;
        match self.transport.send(email).await {
            Ok(response) => Ok(RelayReceipt {
                server_response: response.message().collect::<Vec<_>>().join(" "),
            }),
            Err(e) => Err(RelayError::new(e.to_string())),
        }
    }
}

fn build_message(message: &RelayMessage) -> Result<Message, RelayError> {
    let from_addr = message
        .from_address
        .parse()
        .map_err(|e| RelayError::new(format!("invalid sender address: {e}")))?;
    let from = Mailbox::new(message.from_name.clone(), from_addr);
    let to_addr = message
        .to
        .parse()
        .map_err(|e| RelayError::new(format!("invalid recipient address: {e}")))?;

    let plain = message
        .text
        .clone()
        .unwrap_or_else(|| strip_tags(&message.html));

    Message::builder()
        .from(from)
        .to(Mailbox::new(None, to_addr))
        .subject(message.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            plain,
            message.html.clone(),
        ))
        .map_err(|e| RelayError::new(format!("message build failed: {e}")))
}

/// Crude text alternative for clients that refuse HTML. Good enough for
/// the fallback part; real formatting stays in the HTML body.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// The production connector: credentials in, lettre-backed relay out.
pub struct SmtpConnector;

#[async_trait]
impl RelayConnector for SmtpConnector {
    async fn connect(&self, config: &RelayConfig) -> Result<Box<dyn Relay>, RelayError> {
        Ok(Box::new(SmtpRelay::new(config)?))
    }
}
