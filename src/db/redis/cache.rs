use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::fmt::Display;
use tokio::sync::{mpsc, oneshot};

use crate::error::{AppError, AppResult};

/// Keys of cached catalog lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Catalog entry by primary key
    Course(i64),
    /// Catalog entry by course code, case-insensitive
    CourseCode(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Course(id) => write!(f, "course:{}", id),
            CacheKey::CourseCode(code) => write!(f, "course_code:{}", code.trim().to_uppercase()),
        }
    }
}

/// Opens a Redis client; no connection is made until [`Cache::connect`]
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// Pending write handed to the background writer
struct PendingWrite {
    key: String,
    json: String,
    ttl_secs: u64,
}

/// Read-through cache for catalog lookups
///
/// Reads go straight to Redis over a shared, auto-reconnecting connection.
/// Writes are queued and applied by a background task so request handlers never
/// wait on them.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer
pub struct CacheWriterHandle {
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Asks the writer to flush what is already queued, then waits for it
    pub async fn shutdown(self) {
        if self.stop.send(()).is_err() {
            tracing::warn!("Cache writer already stopped");
        }
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task ended abnormally");
        }
    }
}

impl Cache {
    /// Connects to Redis and starts the background writer
    pub async fn connect(client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(client).await?;
        let (writes, queue) = mpsc::unbounded_channel();
        let (stop, stopped) = oneshot::channel();

        let task = tokio::spawn(Self::run_writer(conn.clone(), queue, stopped));
        tracing::info!("Redis cache connected");

        Ok((Self { conn, writes }, CacheWriterHandle { stop, task }))
    }

    async fn run_writer(
        mut conn: ConnectionManager,
        mut queue: mpsc::UnboundedReceiver<PendingWrite>,
        mut stopped: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                Some(write) = queue.recv() => Self::apply(&mut conn, write).await,
                _ = &mut stopped => break,
            }
        }

        // Drain without waiting for the remaining senders to be dropped
        let mut flushed = 0usize;
        while let Ok(write) = queue.try_recv() {
            Self::apply(&mut conn, write).await;
            flushed += 1;
        }
        tracing::info!(flushed, "Cache writer stopped");
    }

    async fn apply(conn: &mut ConnectionManager, write: PendingWrite) {
        let result: redis::RedisResult<()> =
            conn.set_ex(&write.key, write.json, write.ttl_secs).await;
        if let Err(e) = result {
            tracing::error!(key = %write.key, error = %e, "Cache write failed");
        }
    }

    /// Returns the cached value for `key`, `None` on a miss
    ///
    /// A cached JSON `null` reads back as `Some(None)` for optional values, which
    /// is how negative lookups are remembered.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key.to_string()).await?;

        cached
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache entry {} is not valid JSON: {}", key, e))
                })
            })
            .transpose()
    }

    /// Queues `value` under `key` with a TTL in seconds
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache value could not be serialized");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            json,
            ttl_secs,
        };
        if self.writes.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer stopped, dropping write");
        }
    }
}
