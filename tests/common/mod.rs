//! Shared test harness: in-memory store plus a scripted relay double.
#![allow(dead_code)] // not every test binary uses every helper

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use sendora_hub::config::Config;
use sendora_hub::db;
use sendora_hub::services::campaign_service::{self, NewCampaign, NewRecipient};
use sendora_hub::smtp::{
    Relay, RelayConfig, RelayConnector, RelayError, RelayMessage, RelayReceipt,
};

pub async fn test_pool() -> SqlitePool {
    db::connect_for_tests().await
}

pub fn test_config() -> Config {
    Config::for_tests()
}

pub fn relay_config() -> RelayConfig {
    RelayConfig {
        host: "smtp.test.invalid".into(),
        port: 587,
        username: "mailer".into(),
        password: "hunter2".into(),
    }
}

/// Relay double. Each send pops the next scripted outcome; an empty
/// script means unconditional success.
pub struct MockRelay {
    script: Mutex<VecDeque<Result<(), RelayError>>>,
    pub sent: Mutex<Vec<RelayMessage>>,
    send_latency: Duration,
}

impl MockRelay {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(MockRelay {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_latency: Duration::ZERO,
        })
    }

    pub fn scripted(outcomes: Vec<Result<(), RelayError>>) -> Arc<Self> {
        Arc::new(MockRelay {
            script: Mutex::new(outcomes.into()),
            sent: Mutex::new(Vec::new()),
            send_latency: Duration::ZERO,
        })
    }

    pub fn slow(send_latency: Duration) -> Arc<Self> {
        Arc::new(MockRelay {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_latency,
        })
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

struct SharedRelay(Arc<MockRelay>);

#[async_trait]
impl Relay for SharedRelay {
    async fn verify(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError> {
        if !self.0.send_latency.is_zero() {
            tokio::time::sleep(self.0.send_latency).await;
        }
        let outcome = self.0.script.lock().await.pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => {
                self.0.sent.lock().await.push(message.clone());
                Ok(RelayReceipt {
                    server_response: "250 queued".into(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

pub struct MockConnector(pub Arc<MockRelay>);

#[async_trait]
impl RelayConnector for MockConnector {
    async fn connect(&self, _config: &RelayConfig) -> Result<Box<dyn Relay>, RelayError> {
        Ok(Box::new(SharedRelay(self.0.clone())))
    }
}

/// A connector whose connection attempt always fails, for error-path tests.
pub struct UnreachableConnector;

#[async_trait]
impl RelayConnector for UnreachableConnector {
    async fn connect(&self, _config: &RelayConfig) -> Result<Box<dyn Relay>, RelayError> {
        Err(RelayError::new("connection refused"))
    }
}

/// Create a queued campaign for `owner` with `n` recipients.
pub async fn create_campaign(
    pool: &SqlitePool,
    config: &Config,
    owner: &str,
    n: usize,
    track_opens: bool,
) -> String {
    let recipients = (0..n)
        .map(|i| NewRecipient {
            email: format!("recipient{i}@example.com"),
            variables: HashMap::from([(
                "name".to_string(),
                serde_json::Value::String(format!("Recipient {i} Example")),
            )]),
        })
        .collect();
    let outcome = campaign_service::create(
        pool,
        config,
        NewCampaign {
            owner_id: owner.to_string(),
            subject_template: "Hello {{firstName}}".into(),
            body_template: "<p>Hi {{name}}, news for {{email}}</p>".into(),
            from_address: "news@sender.example".into(),
            from_name: Some("Newsroom".into()),
            track_opens,
            delay_min_ms: 0,
            delay_max_ms: 0,
            recipients,
        },
    )
    .await
    .expect("campaign creation");
    outcome.campaign_id
}

/// Create and start a campaign against the given relay double.
pub async fn running_campaign(
    pool: &SqlitePool,
    config: &Config,
    owner: &str,
    n: usize,
    relay: &Arc<MockRelay>,
) -> String {
    let id = create_campaign(pool, config, owner, n, false).await;
    campaign_service::start(
        pool,
        config,
        &MockConnector(relay.clone()),
        &id,
        relay_config(),
    )
    .await
    .expect("campaign start");
    id
}
