//! Session lifecycle: privacy reset at startup, bounded shutdown.
//!
//! Nothing persists between sessions. Startup wipes every storage class and
//! the HTTP cache before the first surface loads. Shutdown flushes and wipes
//! again, racing the cleanup against a timer so the process always ends
//! within [`LifecycleConfig::shutdown_timeout`](crate::config::LifecycleConfig::shutdown_timeout).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::LifecycleConfig;
use crate::error::ShellResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Cookies,
    LocalStorage,
    CacheStorage,
    FileSystem,
    IndexedDb,
    ServiceWorkers,
    WebSql,
}

impl StorageClass {
    pub const ALL: [StorageClass; 7] = [
        Self::Cookies,
        Self::LocalStorage,
        Self::CacheStorage,
        Self::FileSystem,
        Self::IndexedDb,
        Self::ServiceWorkers,
        Self::WebSql,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cookies => "cookies",
            Self::LocalStorage => "localstorage",
            Self::CacheStorage => "cachestorage",
            Self::FileSystem => "filesystem",
            Self::IndexedDb => "indexdb",
            Self::ServiceWorkers => "serviceworkers",
            Self::WebSql => "websql",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted browsing state of the session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn clear(&self, class: StorageClass) -> ShellResult<()>;
    async fn clear_http_cache(&self) -> ShellResult<()>;
    /// Writes pending data out before it is cleared.
    async fn flush(&self) -> ShellResult<()>;
}

/// Ends the process.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        info!(code, "Exiting");
        std::process::exit(code);
    }
}

/// What a cleanup pass managed to do. Failures are collected, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub failed: Vec<StorageClass>,
    pub http_cache_cleared: bool,
    pub flushed: bool,
}

impl ClearReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.http_cache_cleared
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Cleanup finished before the deadline.
    Cleaned(ClearReport),
    /// The deadline won; the cleanup result is ignored.
    TimedOut,
    /// Another shutdown is already under way; nothing was done.
    AlreadyRunning,
}

/// Clears every class, then the HTTP cache. Each failure is logged and the
/// pass continues.
pub async fn clear_all(storage: &dyn SessionStorage) -> ClearReport {
    let mut report = ClearReport::default();
    for class in StorageClass::ALL {
        if let Err(e) = storage.clear(class).await {
            warn!(%class, error = %e, "Storage clear failed");
            report.failed.push(class);
        }
    }
    match storage.clear_http_cache().await {
        Ok(()) => report.http_cache_cleared = true,
        Err(e) => warn!(error = %e, "HTTP cache clear failed"),
    }
    report
}

pub struct SessionLifecycle {
    storage: Arc<dyn SessionStorage>,
    terminator: Arc<dyn Terminator>,
    timeout: Duration,
    shutdown_started: AtomicBool,
}

impl SessionLifecycle {
    pub fn new(
        storage: Arc<dyn SessionStorage>,
        terminator: Arc<dyn Terminator>,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            terminator,
            timeout,
            shutdown_started: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        config: &LifecycleConfig,
        storage: Arc<dyn SessionStorage>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self::new(storage, terminator, config.shutdown_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::Acquire)
    }

    /// Privacy reset. Must complete before any content surface loads.
    pub async fn startup(&self) -> ClearReport {
        let report = clear_all(self.storage.as_ref()).await;
        info!(
            failed = report.failed.len(),
            http_cache = report.http_cache_cleared,
            "Startup privacy reset done"
        );
        report
    }

    /// Flush, clear, terminate. Runs at most once; later calls return
    /// [`ShutdownOutcome::AlreadyRunning`] without touching storage.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            info!("Shutdown already in progress, ignoring signal");
            return ShutdownOutcome::AlreadyRunning;
        }
        info!(timeout_ms = self.timeout.as_millis() as u64, "Shutting down");

        let storage = self.storage.as_ref();
        let cleanup = async {
            let flushed = match storage.flush().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Storage flush failed");
                    false
                }
            };
            let mut report = clear_all(storage).await;
            report.flushed = flushed;
            report
        };

        let outcome = tokio::select! {
            report = cleanup => {
                info!(failed = report.failed.len(), "Shutdown cleanup done");
                ShutdownOutcome::Cleaned(report)
            }
            () = tokio::time::sleep(self.timeout) => {
                warn!("Shutdown cleanup timed out, forcing exit");
                ShutdownOutcome::TimedOut
            }
        };

        self.terminator.terminate(0);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::ShellError;

    #[derive(Default)]
    struct FakeStorage {
        cleared: Mutex<Vec<StorageClass>>,
        cache_clears: AtomicUsize,
        flushes: AtomicUsize,
        failing: Option<StorageClass>,
        hang: bool,
    }

    impl FakeStorage {
        fn cleared(&self) -> Vec<StorageClass> {
            self.cleared.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionStorage for FakeStorage {
        async fn clear(&self, class: StorageClass) -> ShellResult<()> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.failing == Some(class) {
                return Err(ShellError::StorageClear {
                    class,
                    source: io::Error::other("locked"),
                });
            }
            self.cleared.lock().unwrap().push(class);
            Ok(())
        }

        async fn clear_http_cache(&self) -> ShellResult<()> {
            self.cache_clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn flush(&self) -> ShellResult<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTerminator {
        codes: Mutex<Vec<i32>>,
    }

    impl Terminator for RecordingTerminator {
        fn terminate(&self, code: i32) {
            self.codes.lock().unwrap().push(code);
        }
    }

    fn lifecycle(storage: FakeStorage) -> (SessionLifecycle, Arc<FakeStorage>, Arc<RecordingTerminator>) {
        let storage = Arc::new(storage);
        let terminator = Arc::new(RecordingTerminator::default());
        let lc = SessionLifecycle::new(storage.clone(), terminator.clone(), Duration::from_secs(3));
        (lc, storage, terminator)
    }

    #[tokio::test]
    async fn test_startup_clears_everything() {
        let (lc, storage, terminator) = lifecycle(FakeStorage::default());
        let report = lc.startup().await;

        assert!(report.is_clean());
        assert_eq!(storage.cleared(), StorageClass::ALL.to_vec());
        assert_eq!(storage.cache_clears.load(Ordering::SeqCst), 1);
        assert!(terminator.codes.lock().unwrap().is_empty(), "startup never exits");
    }

    #[tokio::test]
    async fn test_one_failing_class_does_not_stop_the_others() {
        let (lc, storage, _) = lifecycle(FakeStorage {
            failing: Some(StorageClass::IndexedDb),
            ..FakeStorage::default()
        });
        let report = lc.startup().await;

        assert_eq!(report.failed, vec![StorageClass::IndexedDb]);
        assert_eq!(storage.cleared().len(), StorageClass::ALL.len() - 1);
        assert!(report.http_cache_cleared);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_clears_and_terminates() {
        let (lc, storage, terminator) = lifecycle(FakeStorage::default());
        let outcome = lc.shutdown().await;

        let ShutdownOutcome::Cleaned(report) = outcome else {
            panic!("expected Cleaned, got {outcome:?}");
        };
        assert!(report.flushed);
        assert_eq!(storage.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.cleared(), StorageClass::ALL.to_vec());
        assert_eq!(*terminator.codes.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (lc, storage, terminator) = lifecycle(FakeStorage::default());
        let (a, b) = tokio::join!(lc.shutdown(), lc.shutdown());

        let already = [&a, &b]
            .iter()
            .filter(|o| ***o == ShutdownOutcome::AlreadyRunning)
            .count();
        assert_eq!(already, 1, "exactly one call does the work: {a:?} {b:?}");
        assert_eq!(storage.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.cleared().len(), StorageClass::ALL.len());
        assert_eq!(terminator.codes.lock().unwrap().len(), 1);
        assert_eq!(lc.shutdown().await, ShutdownOutcome::AlreadyRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cleanup_is_bounded_by_timeout() {
        let (lc, _, terminator) = lifecycle(FakeStorage {
            hang: true,
            ..FakeStorage::default()
        });
        let started = tokio::time::Instant::now();
        let outcome = lc.shutdown().await;

        assert_eq!(outcome, ShutdownOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(*terminator.codes.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_storage_class_names() {
        assert_eq!(StorageClass::IndexedDb.to_string(), "indexdb");
        assert_eq!(StorageClass::ALL.len(), 7);
    }
}
