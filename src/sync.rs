//! Reconciles local completion events with the server's progress record.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheLayer, CacheResult};
use crate::error::CacheError;
use crate::model::{Component, StudentProgressRecord};
use crate::progress::award_points;
use crate::remote::{ApiCompletion, RemoteContentService};
use crate::session::Session;

/// Outcome of a successful completion submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
  pub points: u32,
  pub record: StudentProgressRecord,
}

/// Owner of the student's progress record.
///
/// The record is only ever replaced as a whole with what the remote service
/// returns. Completions are submitted one at a time.
#[derive(Clone)]
pub struct SyncReconciler {
  inner: Arc<Reconciler>,
}

struct Reconciler {
  remote: Arc<dyn RemoteContentService>,
  cache: CacheLayer,
  session: Session,
  record: RwLock<Option<StudentProgressRecord>>,
  completing: Mutex<()>,
}

impl SyncReconciler {
  pub fn new(remote: Arc<dyn RemoteContentService>, cache: CacheLayer, session: Session) -> Self {
    Self {
      inner: Arc::new(Reconciler {
        remote,
        cache,
        session,
        record: RwLock::new(None),
        completing: Mutex::new(()),
      }),
    }
  }

  /// Load the persisted record into memory. An unreadable entry counts as absent.
  pub async fn load(&self) -> Result<Option<StudentProgressRecord>, CacheError> {
    let stored = match self
      .inner
      .cache
      .load::<StudentProgressRecord>(&CacheKey::StudentRecord)
    {
      Ok(stored) => stored.map(|c| c.value),
      Err(CacheError::CorruptEntry { key }) => {
        warn!(key = %key, "discarding unreadable progress record");
        None
      }
      Err(e) => return Err(e),
    };

    *self.inner.record.write().await = stored.clone();
    Ok(stored)
  }

  pub async fn current_record(&self) -> Option<StudentProgressRecord> {
    self.inner.record.read().await.clone()
  }

  /// Re-read the record from the remote service, falling back to the stored copy.
  pub async fn refresh_student_record(
    &self,
  ) -> Result<CacheResult<StudentProgressRecord>, CacheError> {
    let user_id = &self.inner.session.user_id;
    let result = self
      .inner
      .cache
      .fetch_with_fallback(
        &CacheKey::StudentRecord,
        || self.inner.remote.get_student_info(user_id),
        |student| student.into_record(),
      )
      .await?;

    *self.inner.record.write().await = Some(result.data.clone());
    Ok(result)
  }

  /// Submit a completion for `component` and adopt the server's returned record.
  ///
  /// Fails with `ComponentNotFound` when the local record has no entry for the
  /// component under `course_id` and its section; refresh the record before
  /// retrying. A remote failure leaves local state untouched.
  ///
  /// The server's returned record replaces the in-memory copy even when
  /// persisting it fails; that failure is returned as `CacheError::Store` and
  /// the record is written again by [`SyncReconciler::flush`].
  pub async fn complete_component(
    &self,
    component: &Component,
    course_id: &str,
    success: bool,
  ) -> Result<Completion, CacheError> {
    let _completing = self.inner.completing.lock().await;

    let record = self
      .current_record()
      .await
      .filter(|r| {
        r.component(course_id, component.section_id(), component.component_id())
          .is_some()
      })
      .ok_or_else(|| CacheError::ComponentNotFound {
        course_id: course_id.to_string(),
        component_id: component.component_id().to_string(),
      })?;

    let points = award_points(&record, component.component_id(), success);
    let completion = ApiCompletion {
      comp_id: component.component_id().to_string(),
      parent_section: component.section_id().to_string(),
      comp_type: component.kind(),
      is_complete: success,
      points,
    };

    let token = self.inner.session.token()?;
    let updated = self
      .inner
      .remote
      .complete_component(&self.inner.session.user_id, &completion, token)
      .await?
      .into_record()?;

    *self.inner.record.write().await = Some(updated.clone());
    if let Err(e) = self.inner.cache.write(&CacheKey::StudentRecord, &updated) {
      warn!(error = %e, "failed to persist progress record");
      return Err(CacheError::Store(e));
    }

    info!(
      component_id = %completion.comp_id,
      success,
      points,
      "component completion reconciled"
    );
    Ok(Completion {
      points,
      record: updated,
    })
  }

  /// Write the in-memory record back and flush the store.
  pub async fn flush(&self) -> Result<(), CacheError> {
    if let Some(record) = self.inner.record.read().await.as_ref() {
      self.inner.cache.write(&CacheKey::StudentRecord, record)?;
    }
    self.inner.cache.store().flush()?;
    debug!("progress record flushed");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{DurableStore, MemoryStore, StoredValue, WriteOp};
  use crate::error::StoreError;
  use crate::model::ComponentContent;
  use crate::remote::fake::FakeRemote;
  use std::sync::atomic::{AtomicBool, Ordering};

  /// Memory store whose plain writes can be switched off.
  #[derive(Default)]
  struct FlakyStore {
    inner: MemoryStore,
    read_only: AtomicBool,
  }

  impl DurableStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
      self.inner.get(key)
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
      if self.read_only.load(Ordering::SeqCst) {
        return Err(StoreError::Backend("disk full".to_string()));
      }
      self.inner.set(key, data)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
      self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
      self.inner.keys()
    }

    fn write_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
      self.inner.write_batch(ops)
    }

    fn flush(&self) -> Result<(), StoreError> {
      self.inner.flush()
    }
  }

  fn session() -> Session {
    Session {
      user_id: "u1".to_string(),
      user_info: None,
      login_token: Some("tok".to_string()),
    }
  }

  fn exercise(id: &str, section_id: &str) -> Component {
    Component {
      position: 1,
      content: ComponentContent::Exercise(FakeRemote::exercise(id, section_id).into_exercise().unwrap()),
    }
  }

  async fn setup() -> (Arc<FakeRemote>, Arc<MemoryStore>, SyncReconciler) {
    let remote = Arc::new(FakeRemote::sample());
    remote.enroll();
    let store = Arc::new(MemoryStore::new());
    let sync = SyncReconciler::new(remote.clone(), CacheLayer::new(store.clone()), session());
    sync.refresh_student_record().await.unwrap();
    (remote, store, sync)
  }

  #[tokio::test]
  async fn test_first_correct_attempt_awards_ten() {
    let (_remote, store, sync) = setup().await;

    let done = sync.complete_component(&exercise("e1", "s1"), "c1", true).await.unwrap();
    assert_eq!(done.points, 10);
    assert_eq!(done.record.points, 10);

    // The returned record replaced the persisted one.
    let stored = CacheLayer::new(store)
      .load::<StudentProgressRecord>(&CacheKey::StudentRecord)
      .unwrap()
      .unwrap();
    assert_eq!(stored.value, done.record);
  }

  #[tokio::test]
  async fn test_repeat_completion_is_idempotent() {
    let (_remote, _store, sync) = setup().await;
    let e1 = exercise("e1", "s1");

    sync.complete_component(&e1, "c1", true).await.unwrap();
    let again = sync.complete_component(&e1, "c1", true).await.unwrap();

    assert_eq!(again.points, 0);
    assert_eq!(again.record.points, 10);
  }

  #[tokio::test]
  async fn test_correct_retry_after_wrong_answer_awards_five() {
    let (_remote, _store, sync) = setup().await;
    let e2 = exercise("e2", "s2");

    let wrong = sync.complete_component(&e2, "c1", false).await.unwrap();
    assert_eq!(wrong.points, 0);
    let retry = sync.complete_component(&e2, "c1", true).await.unwrap();
    assert_eq!(retry.points, 5);
    assert_eq!(retry.record.points, 5);
  }

  #[tokio::test]
  async fn test_remote_failure_leaves_state_unchanged() {
    let (remote, store, sync) = setup().await;
    let before = sync.current_record().await;
    let stored_before = store.get("@studentInfo").unwrap().unwrap().data;

    remote.fail("complete:u1");
    let err = sync.complete_component(&exercise("e1", "s1"), "c1", true).await.unwrap_err();

    assert!(matches!(err, CacheError::Remote(_)));
    assert_eq!(sync.current_record().await, before);
    assert_eq!(store.get("@studentInfo").unwrap().unwrap().data, stored_before);
  }

  #[tokio::test]
  async fn test_unknown_course_requires_refresh() {
    let (remote, _store, sync) = setup().await;

    let err = sync.complete_component(&exercise("e9", "s9"), "c9", true).await.unwrap_err();
    assert!(matches!(err, CacheError::ComponentNotFound { ref course_id, .. } if course_id == "c9"));
    assert_eq!(remote.call_count("complete:u1"), 0);
  }

  #[tokio::test]
  async fn test_component_missing_from_known_section() {
    let remote = Arc::new(FakeRemote::sample());
    remote.set_student(serde_json::json!({
      "_id": "u1",
      "courses": [{ "courseId": "c1", "sections": [{ "sectionId": "s1", "components": [
        { "compId": "l1", "compType": "lecture", "isFirstAttempt": true }
      ]}]}]
    }));
    let sync = SyncReconciler::new(
      remote.clone(),
      CacheLayer::new(Arc::new(MemoryStore::new())),
      session(),
    );
    sync.refresh_student_record().await.unwrap();
    let before = sync.current_record().await;

    let err = sync.complete_component(&exercise("e1", "s1"), "c1", true).await.unwrap_err();
    assert!(matches!(err, CacheError::ComponentNotFound { ref component_id, .. } if component_id == "e1"));
    assert_eq!(remote.call_count("complete:u1"), 0);
    assert_eq!(sync.current_record().await, before);
  }

  #[tokio::test]
  async fn test_persist_failure_is_reported_and_flush_rewrites() {
    let remote = Arc::new(FakeRemote::sample());
    remote.enroll();
    let store = Arc::new(FlakyStore::default());
    let sync = SyncReconciler::new(remote.clone(), CacheLayer::new(store.clone()), session());
    sync.refresh_student_record().await.unwrap();

    store.read_only.store(true, Ordering::SeqCst);
    let err = sync.complete_component(&exercise("e1", "s1"), "c1", true).await.unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));

    // The server accepted it, so memory follows the server.
    assert_eq!(remote.call_count("complete:u1"), 1);
    assert_eq!(sync.current_record().await.unwrap().points, 10);
    let stored = CacheLayer::new(store.clone())
      .load::<StudentProgressRecord>(&CacheKey::StudentRecord)
      .unwrap()
      .unwrap();
    assert_eq!(stored.value.points, 0);

    store.read_only.store(false, Ordering::SeqCst);
    sync.flush().await.unwrap();
    let stored = CacheLayer::new(store)
      .load::<StudentProgressRecord>(&CacheKey::StudentRecord)
      .unwrap()
      .unwrap();
    assert_eq!(stored.value.points, 10);
  }

  #[tokio::test]
  async fn test_refresh_falls_back_to_stored_record() {
    let (remote, store, _sync) = setup().await;
    remote.set_offline(true);

    let sync = SyncReconciler::new(remote, CacheLayer::new(store), session());
    assert!(sync.load().await.unwrap().is_some());
    let refreshed = sync.refresh_student_record().await.unwrap();
    assert!(refreshed.is_offline());
    assert_eq!(refreshed.data.student_id, "u1");
  }

  #[tokio::test]
  async fn test_concurrent_completions_award_once() {
    let (_remote, _store, sync) = setup().await;
    let e1 = exercise("e1", "s1");

    let (a, b) = tokio::join!(
      sync.complete_component(&e1, "c1", true),
      sync.complete_component(&e1, "c1", true)
    );
    let total = a.unwrap().points + b.unwrap().points;
    assert_eq!(total, 10);
    assert_eq!(sync.current_record().await.unwrap().points, 10);
  }
}
