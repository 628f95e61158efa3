//! Redis backed concurrency slot manager

use async_trait::async_trait;
use judge_core::{JudgeError, JudgeResult};
use judge_domain::ports::ConcurrencySlotManager;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Read the counter (0 when absent), increment only while below the limit.
const ACQUIRE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    current = 0
else
    current = tonumber(current)
end
if current < tonumber(ARGV[1]) then
    redis.call('INCR', KEYS[1])
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Decrement and drop the key once it reaches zero or below.
const RELEASE_SCRIPT: &str = r#"
local value = redis.call('DECR', KEYS[1])
if value <= 0 then
    redis.call('DEL', KEYS[1])
end
return value
"#;

fn unavailable(err: redis::RedisError) -> JudgeError {
    JudgeError::CounterServiceUnavailable(err.to_string())
}

/// Fleet-wide slot counter shared by every service instance.
///
/// The connection is established on first use, so the service can start
/// while Redis is down and pick it up once it comes back.
pub struct RedisSlotManager {
    /// Redis client
    client: redis::Client,
    /// Lazily initialised connection manager
    connection: OnceCell<ConnectionManager>,
    /// Safety-net expiry for slot keys
    key_ttl_seconds: u64,
    connect_timeout: Duration,
    acquire_script: Script,
    release_script: Script,
}

impl RedisSlotManager {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Create a manager without touching the network
    pub fn new(redis_url: &str, key_ttl_seconds: u64) -> JudgeResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| JudgeError::Configuration(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            key_ttl_seconds,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            acquire_script: Script::new(ACQUIRE_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Get the shared connection, connecting on first use
    async fn get_connection(&self) -> JudgeResult<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting to Redis slot counter");
                match tokio::time::timeout(
                    self.connect_timeout,
                    self.client.get_connection_manager(),
                )
                .await
                {
                    Ok(Ok(conn)) => {
                        info!("Redis slot counter connected");
                        Ok(conn)
                    }
                    Ok(Err(e)) => Err(unavailable(e)),
                    Err(_) => Err(JudgeError::CounterServiceUnavailable(format!(
                        "connection timed out after {:?}",
                        self.connect_timeout
                    ))),
                }
            })
            .await?;

        Ok(conn.clone())
    }

    /// Startup connectivity check. Failures are logged, never fatal.
    pub async fn ping(&self) -> bool {
        let result = async {
            let mut conn = self.get_connection().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            Ok::<_, JudgeError>(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis slot counter is not reachable yet: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ConcurrencySlotManager for RedisSlotManager {
    #[instrument(skip(self))]
    async fn acquire_slot(&self, key: &str, max: i64) -> JudgeResult<bool> {
        let mut conn = self.get_connection().await?;

        let acquired: i64 = self
            .acquire_script
            .key(key)
            .arg(max)
            .arg(self.key_ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        debug!("Slot acquire on {}: {}", key, acquired == 1);
        Ok(acquired == 1)
    }

    #[instrument(skip(self))]
    async fn release_slot(&self, key: &str) -> JudgeResult<()> {
        let mut conn = self.get_connection().await?;

        let remaining: i64 = self
            .release_script
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        debug!("Slot released on {}, remaining {}", key, remaining.max(0));
        Ok(())
    }

    async fn current_concurrency(&self, key: &str) -> JudgeResult<i64> {
        let mut conn = self.get_connection().await?;

        let value: Option<i64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(value.unwrap_or(0).max(0))
    }
}
