//! Completion percentages and the points rules.

use tracing::debug;

use crate::content::ContentCache;
use crate::error::CacheError;
use crate::model::{Section, StudentProgressRecord};
use crate::sync::SyncReconciler;

const FIRST_ATTEMPT_POINTS: u32 = 10;
const RETRY_POINTS: u32 = 5;

/// Floor of `completed / total` as a percentage; an empty total is 0%.
pub fn percentage(completed: usize, total: usize) -> u8 {
  if total == 0 {
    return 0;
  }
  // Bounded by 100 as long as completed <= total.
  (completed.min(total) * 100 / total) as u8
}

/// True if any entry for the component is marked complete.
pub fn is_component_completed(record: &StudentProgressRecord, component_id: &str) -> bool {
  record
    .component_entries(component_id)
    .any(|entry| entry.is_complete)
}

/// Number of the section's components the record marks complete.
pub fn completed_in_section(record: &StudentProgressRecord, section: &Section) -> usize {
  section
    .components
    .iter()
    .filter(|c| is_component_completed(record, &c.component_id))
    .count()
}

/// Points earned by a completion event.
///
/// A correct first attempt earns 10, a correct retry earns 5, and a component
/// that is already complete earns nothing. The first-attempt flag comes from
/// the component's entries in the record.
pub fn award_points(record: &StudentProgressRecord, component_id: &str, success: bool) -> u32 {
  if !success || is_component_completed(record, component_id) {
    return 0;
  }

  let first_attempt = record
    .component_entries(component_id)
    .any(|e| e.is_first_attempt);
  if first_attempt {
    FIRST_ATTEMPT_POINTS
  } else {
    RETRY_POINTS
  }
}

/// Position of the first incomplete component recorded for the section.
pub fn next_uncompleted_component(
  record: &StudentProgressRecord,
  course_id: &str,
  section_id: &str,
) -> Option<usize> {
  record
    .section(course_id, section_id)?
    .components
    .iter()
    .position(|c| !c.is_complete)
}

/// Progress queries over the current record and cached course content.
///
/// Lookup failures are soft: they are logged and reported as no progress.
#[derive(Clone)]
pub struct ProgressTracker {
  content: ContentCache,
  sync: SyncReconciler,
}

impl ProgressTracker {
  pub fn new(content: ContentCache, sync: SyncReconciler) -> Self {
    Self { content, sync }
  }

  /// Percentage of the course's components completed, in [0, 100].
  pub async fn course_progress(&self, course_id: &str) -> u8 {
    match self.try_course_progress(course_id).await {
      Ok(progress) => progress,
      Err(e) => {
        debug!(course_id = %course_id, error = %e, "course progress unavailable");
        0
      }
    }
  }

  async fn try_course_progress(&self, course_id: &str) -> Result<u8, CacheError> {
    let Some(record) = self.sync.current_record().await else {
      return Ok(0);
    };
    let sections = self.content.sections(course_id).await?.data;

    let total = sections.iter().map(|s| s.components.len()).sum();
    let completed = sections
      .iter()
      .map(|s| completed_in_section(&record, s))
      .sum();
    Ok(percentage(completed, total))
  }

  /// Count of the section's components completed (not a percentage).
  pub async fn section_progress(&self, section_id: &str) -> usize {
    let Some(record) = self.sync.current_record().await else {
      return 0;
    };
    match self.content.section(section_id).await {
      Ok(section) => completed_in_section(&record, &section.data),
      Err(e) => {
        debug!(section_id = %section_id, error = %e, "section progress unavailable");
        0
      }
    }
  }

  pub async fn is_component_completed(&self, component_id: &str) -> bool {
    self
      .sync
      .current_record()
      .await
      .is_some_and(|r| is_component_completed(&r, component_id))
  }

  /// True if the record flags the section complete in any course.
  pub async fn is_section_completed(&self, section_id: &str) -> bool {
    self.sync.current_record().await.is_some_and(|r| {
      r.courses
        .iter()
        .flat_map(|c| c.sections.iter())
        .any(|s| s.section_id == section_id && s.is_complete)
    })
  }

  pub async fn is_course_completed(&self, course_id: &str) -> bool {
    self.course_progress(course_id).await == 100
  }

  pub async fn next_uncompleted_component(
    &self,
    course_id: &str,
    section_id: &str,
  ) -> Option<usize> {
    let record = self.sync.current_record().await?;
    next_uncompleted_component(&record, course_id, section_id)
  }
}
