//! Content reads with transparent write-through caching and offline fallback.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheKey, CacheLayer, CacheResult, CacheSource};
use crate::error::CacheError;
use crate::media::ImagePayload;
use crate::model::{Component, ComponentContent, ComponentKind, Course, Exercise, Lecture, Section};
use crate::remote::api_types::{normalize_all, ApiCourse};
use crate::remote::RemoteContentService;

/// Course content reader.
///
/// Wraps the remote service with the same API, caching every successful read
/// and serving the stored copy when the network is unavailable.
#[derive(Clone)]
pub struct ContentCache {
  remote: Arc<dyn RemoteContentService>,
  cache: CacheLayer,
  user_id: String,
}

impl ContentCache {
  pub fn new(remote: Arc<dyn RemoteContentService>, cache: CacheLayer, user_id: &str) -> Self {
    Self {
      remote,
      cache,
      user_id: user_id.to_string(),
    }
  }

  /// All courses.
  pub async fn courses(&self) -> Result<CacheResult<Vec<Course>>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::CourseList,
        || self.remote.get_courses(),
        |list| normalize_all(list, ApiCourse::into_course),
      )
      .await
  }

  pub async fn course(&self, course_id: &str) -> Result<CacheResult<Course>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::course(course_id),
        || self.remote.get_course(course_id),
        ApiCourse::into_course,
      )
      .await
  }

  /// Sections of a course; a network read also refreshes each single-section entry.
  pub async fn sections(&self, course_id: &str) -> Result<CacheResult<Vec<Section>>, CacheError> {
    let result = self
      .cache
      .fetch_with_fallback(
        &CacheKey::sections(course_id),
        || self.remote.get_all_sections(course_id),
        |list| normalize_all(list, |s| s.into_section()),
      )
      .await?;

    if result.source == CacheSource::Network {
      for section in &result.data {
        if let Err(e) = self.cache.write(&CacheKey::section(&section.section_id), section) {
          warn!(section_id = %section.section_id, error = %e, "failed to cache section");
        }
      }
    }

    Ok(result)
  }

  pub async fn section(&self, section_id: &str) -> Result<CacheResult<Section>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::section(section_id),
        || self.remote.get_section(section_id),
        |s| s.into_section(),
      )
      .await
  }

  pub async fn lectures(&self, section_id: &str) -> Result<CacheResult<Vec<Lecture>>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::lectures(section_id),
        || self.remote.get_lectures_in_section(section_id),
        |list| normalize_all(list, |l| l.into_lecture()),
      )
      .await
  }

  pub async fn exercises(&self, section_id: &str) -> Result<CacheResult<Vec<Exercise>>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::exercises(section_id),
        || self.remote.get_exercises_in_section(section_id),
        |list| normalize_all(list, |e| e.into_exercise()),
      )
      .await
  }

  /// Image of a lecture. A stored payload whose digest no longer matches is a miss.
  pub async fn image(
    &self,
    lecture_id: &str,
    file_name: &str,
  ) -> Result<CacheResult<ImagePayload>, CacheError> {
    let key = CacheKey::image(lecture_id);
    let result = self
      .cache
      .fetch_with_fallback(
        &key,
        || self.remote.get_bucket_image(file_name),
        |bytes| Ok(ImagePayload::new(file_name, bytes)),
      )
      .await?;

    if result.is_offline() && !result.data.verify() {
      warn!(lecture_id = %lecture_id, "cached image failed digest check");
      return Err(CacheError::CorruptEntry {
        key: key.storage_key(),
      });
    }
    Ok(result)
  }

  /// Courses the current user is subscribed to.
  pub async fn subscriptions(&self) -> Result<CacheResult<Vec<Course>>, CacheError> {
    self
      .cache
      .fetch_with_fallback(
        &CacheKey::subscriptions(&self.user_id),
        || self.remote.get_subscriptions(&self.user_id),
        |list| normalize_all(list, ApiCourse::into_course),
      )
      .await
  }

  pub async fn is_subscribed(&self, course_id: &str) -> Result<bool, CacheError> {
    let subscribed = self.subscriptions().await?;
    Ok(subscribed.data.iter().any(|c| c.course_id == course_id))
  }

  /// Subscribe (write operation, not cached).
  pub async fn subscribe(&self, course_id: &str) -> Result<(), CacheError> {
    self
      .remote
      .subscribe_to_course(&self.user_id, course_id)
      .await?;
    self.refresh_subscriptions().await;
    Ok(())
  }

  /// Unsubscribe (write operation, not cached).
  pub async fn unsubscribe(&self, course_id: &str) -> Result<(), CacheError> {
    self
      .remote
      .unsubscribe_from_course(&self.user_id, course_id)
      .await?;
    self.refresh_subscriptions().await;
    Ok(())
  }

  async fn refresh_subscriptions(&self) {
    if let Err(e) = self.subscriptions().await {
      warn!(error = %e, "failed to refresh subscriptions");
    }
  }

  /// Lectures and exercises of a section merged in the section's order.
  ///
  /// Components the section lists but neither list contains are skipped.
  pub async fn section_components(&self, section: &Section) -> Result<Vec<Component>, CacheError> {
    let lectures = self.lectures(&section.section_id).await?.data;
    let exercises = self.exercises(&section.section_id).await?.data;
    Ok(assemble_components(section, lectures, exercises))
  }
}

/// Place lectures and exercises at their section positions.
pub fn assemble_components(
  section: &Section,
  lectures: Vec<Lecture>,
  exercises: Vec<Exercise>,
) -> Vec<Component> {
  let mut lectures: HashMap<String, Lecture> = lectures
    .into_iter()
    .map(|l| (l.lecture_id.clone(), l))
    .collect();
  let mut exercises: HashMap<String, Exercise> = exercises
    .into_iter()
    .map(|e| (e.exercise_id.clone(), e))
    .collect();

  section
    .components
    .iter()
    .enumerate()
    .filter_map(|(position, r)| {
      let content = match r.kind {
        ComponentKind::Lecture => ComponentContent::Lecture(lectures.remove(&r.component_id)?),
        ComponentKind::Exercise => ComponentContent::Exercise(exercises.remove(&r.component_id)?),
      };
      Some(Component { position, content })
    })
    .collect()
}
