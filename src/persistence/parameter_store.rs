//! In-memory parameter snapshot with single-writer updates.
//!
//! Readers take an `Arc<Parameters>` and never hold the lock while computing,
//! so a prediction always sees one complete set: the one before an update or
//! the one after it. Writers are serialized by `writer` for the whole
//! read-compute-persist-swap sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::ml::Parameters;
use crate::persistence::model_file::ModelRepository;

/// Outcome of a committed update.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    /// Whether the new set was written to the repository.
    pub persisted: bool,
    /// Number of updates applied since the store was created.
    pub version: u64,
}

pub struct ParameterStore {
    current: RwLock<Arc<Parameters>>,
    writer: Mutex<()>,
    repository: Arc<dyn ModelRepository>,
    persist_on_train: bool,
    updates_applied: AtomicU64,
}

impl ParameterStore {
    pub fn new(
        params: Parameters,
        repository: Arc<dyn ModelRepository>,
        persist_on_train: bool,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(params)),
            writer: Mutex::new(()),
            repository,
            persist_on_train,
            updates_applied: AtomicU64::new(0),
        }
    }

    /// Load the initial set from `repository`.
    pub async fn open(repository: Arc<dyn ModelRepository>, persist_on_train: bool) -> Result<Self> {
        let params = repository.load().await?;
        info!(
            source = %repository.describe(),
            hidden_units = params.hidden_units(),
            persist_on_train,
            "parameter store ready"
        );
        Ok(Self::new(params, repository, persist_on_train))
    }

    /// Current parameter set.
    pub async fn snapshot(&self) -> Arc<Parameters> {
        Arc::clone(&*self.current.read().await)
    }

    pub fn persist_on_train(&self) -> bool {
        self.persist_on_train
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::Acquire)
    }

    /// Derive a new set from the current one and swap it in.
    ///
    /// With persistence enabled the new set is saved first; if saving fails
    /// nothing is swapped and the error is returned.
    pub async fn apply<T, F>(&self, f: F) -> Result<Committed<T>>
    where
        F: FnOnce(&Parameters) -> Result<(Parameters, T)>,
    {
        let _writer = self.writer.lock().await;

        let base = self.snapshot().await;
        let (next, value) = f(&base)?;

        if self.persist_on_train {
            if let Err(e) = self.repository.save(&next).await {
                error!(
                    target_store = %self.repository.describe(),
                    error = %e,
                    "failed to persist parameters, keeping previous set"
                );
                return Err(e);
            }
        }

        *self.current.write().await = Arc::new(next);
        let version = self.updates_applied.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, persisted = self.persist_on_train, "parameter set swapped");

        Ok(Committed {
            value,
            persisted: self.persist_on_train,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DigitError;
    use crate::ml::Matrix;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingRepository {
        saves: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ModelRepository for RecordingRepository {
        async fn load(&self) -> Result<Parameters> {
            Parameters::random(4, &mut StdRng::seed_from_u64(9))
        }

        async fn save(&self, _params: &Parameters) -> Result<()> {
            if self.fail {
                return Err(DigitError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn bump_b2(params: &Parameters) -> Result<(Parameters, ())> {
        let mut next = params.clone();
        next.b2 = next.b2.map(|v| v + 1.0);
        Ok((next, ()))
    }

    #[tokio::test]
    async fn apply_swaps_whole_set() {
        let repo = Arc::new(RecordingRepository::default());
        let store = ParameterStore::open(repo.clone(), false).await.unwrap();
        let before = store.snapshot().await;

        let committed = store.apply(bump_b2).await.unwrap();
        assert_eq!(committed.version, 1);
        assert!(!committed.persisted);
        assert_eq!(repo.saves.load(Ordering::SeqCst), 0);

        let after = store.snapshot().await;
        assert_eq!(after.b2, before.b2.map(|v| v + 1.0));
        assert_eq!(after.w1, before.w1);
        // The old snapshot is untouched.
        assert_ne!(before.b2, after.b2);
    }

    #[tokio::test]
    async fn persists_before_swapping() {
        let repo = Arc::new(RecordingRepository::default());
        let store = ParameterStore::open(repo.clone(), true).await.unwrap();
        let committed = store.apply(bump_b2).await.unwrap();
        assert!(committed.persisted);
        assert_eq!(repo.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_set() {
        let repo = Arc::new(RecordingRepository {
            fail: true,
            ..Default::default()
        });
        let store = ParameterStore::open(repo, true).await.unwrap();
        let before = store.snapshot().await;

        assert!(store.apply(bump_b2).await.is_err());
        assert_eq!(*store.snapshot().await, *before);
        assert_eq!(store.updates_applied(), 0);
    }

    #[tokio::test]
    async fn failed_computation_keeps_previous_set() {
        let store = ParameterStore::open(Arc::new(RecordingRepository::default()), false)
            .await
            .unwrap();
        let result = store
            .apply(|_| -> Result<(Parameters, ())> { Err(DigitError::InvalidLabel(11)) })
            .await;
        assert!(matches!(result, Err(DigitError::InvalidLabel(11))));
        assert_eq!(store.updates_applied(), 0);
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let store = Arc::new(
            ParameterStore::open(Arc::new(RecordingRepository::default()), false)
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.apply(bump_b2).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let start = Parameters::random(4, &mut StdRng::seed_from_u64(9)).unwrap();
        let expected: Matrix = start.b2.map(|v| v + 16.0);
        let got = store.snapshot().await;
        for (a, b) in got.b2.as_slice().iter().zip(expected.as_slice()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(store.updates_applied(), 16);
    }
}
