//! Boundary to the remote content service.

pub mod api_types;
mod client;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

pub use api_types::{ApiCompletion, ApiCourse, ApiExercise, ApiLecture, ApiSection, ApiStudent};
pub use client::HttpContentService;

use crate::error::RemoteError;

/// Operations the cache layer consumes from the remote service.
///
/// Every failure (unreachable, timeout, non-2xx, undecodable body) is reported
/// as a `RemoteError`.
#[async_trait]
pub trait RemoteContentService: Send + Sync {
  async fn get_course(&self, course_id: &str) -> Result<ApiCourse, RemoteError>;

  async fn get_courses(&self) -> Result<Vec<ApiCourse>, RemoteError>;

  async fn get_all_sections(&self, course_id: &str) -> Result<Vec<ApiSection>, RemoteError>;

  async fn get_section(&self, section_id: &str) -> Result<ApiSection, RemoteError>;

  async fn get_lectures_in_section(&self, section_id: &str) -> Result<Vec<ApiLecture>, RemoteError>;

  async fn get_exercises_in_section(
    &self,
    section_id: &str,
  ) -> Result<Vec<ApiExercise>, RemoteError>;

  /// Raw bytes of a bucket image.
  async fn get_bucket_image(&self, file_name: &str) -> Result<Vec<u8>, RemoteError>;

  async fn get_subscriptions(&self, user_id: &str) -> Result<Vec<ApiCourse>, RemoteError>;

  async fn subscribe_to_course(&self, user_id: &str, course_id: &str) -> Result<(), RemoteError>;

  async fn unsubscribe_from_course(&self, user_id: &str, course_id: &str)
    -> Result<(), RemoteError>;

  async fn get_student_info(&self, user_id: &str) -> Result<ApiStudent, RemoteError>;

  /// Submit a completion and receive the student's updated record.
  async fn complete_component(
    &self,
    user_id: &str,
    completion: &ApiCompletion,
    token: &str,
  ) -> Result<ApiStudent, RemoteError>;
}
