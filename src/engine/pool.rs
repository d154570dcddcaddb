use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{Engine, EngineConnection, EngineError, EngineErrorKind, EngineResult};

/// Bounded, process-wide pool of engine connections.
///
/// Each call checks out exactly one connection for the duration of a
/// blocking engine operation. The connection and its permit travel with
/// the blocking task and are returned when that task finishes, so a caller
/// that gives up on a timeout never leaks a slot and shutdown can wait for
/// work that is still running.
#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    engine: Arc<dyn Engine>,
    idle: Mutex<Vec<Box<dyn EngineConnection>>>,
    permits: Arc<Semaphore>,
    size: u32,
    acquire_timeout: Duration,
    command_timeout: Duration,
}

impl EnginePool {
    pub fn new(
        engine: Arc<dyn Engine>,
        size: u32,
        acquire_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        let size = size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                engine,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(size as usize)),
                size,
                acquire_timeout,
                command_timeout,
            }),
        }
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.inner.size
    }

    /// Number of connections currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        (self.inner.size as usize).saturating_sub(self.inner.permits.available_permits())
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle_guard().len()
    }

    /// Runs a blocking engine operation on a pooled connection.
    pub async fn run<T, F>(&self, op: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn EngineConnection) -> EngineResult<T> + Send + 'static,
    {
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        .map_err(|_| EngineError::timeout("timed out waiting for an engine connection"))?
        .map_err(|_| EngineError::unavailable("engine pool is closed"))?;

        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || {
            let mut lease = Lease::checkout(inner, permit)?;
            lease.run(op)
        });

        match tokio::time::timeout(self.inner.command_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EngineError::unavailable(format!(
                "engine task failed: {join_err}"
            ))),
            Err(_) => Err(EngineError::timeout(format!(
                "engine command exceeded {}s",
                self.inner.command_timeout.as_secs_f64()
            ))),
        }
    }

    /// Waits for every in-flight engine call to finish, then refuses new
    /// work and drops idle connections.
    pub async fn close(&self) {
        let all = self.inner.size;
        match self.inner.permits.acquire_many(all).await {
            Ok(permits) => {
                self.inner.permits.close();
                drop(permits);
            }
            Err(_) => return,
        }
        let drained = std::mem::take(&mut *self.inner.idle_guard());
        tracing::info!(connections = drained.len(), "engine pool closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }
}

impl PoolInner {
    fn idle_guard(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn EngineConnection>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A checked-out connection plus the permit that reserves its slot.
struct Lease {
    pool: Arc<PoolInner>,
    conn: Option<Box<dyn EngineConnection>>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    fn checkout(pool: Arc<PoolInner>, permit: OwnedSemaphorePermit) -> EngineResult<Self> {
        let idle = pool.idle_guard().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => pool.engine.connect()?,
        };
        Ok(Self {
            pool,
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Runs `op` on the leased connection. A connection that reports itself
    /// unavailable is not returned to the pool.
    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut dyn EngineConnection) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let Some(conn) = self.conn.as_deref_mut() else {
            return Err(EngineError::unavailable("connection already discarded"));
        };
        let result = op(conn);
        if matches!(&result, Err(e) if e.kind == EngineErrorKind::Unavailable) {
            self.conn = None;
        }
        result
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle_guard().push(conn);
        }
    }
}
