use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{ApiCompletion, ApiCourse, ApiExercise, ApiLecture, ApiSection, ApiStudent};
use super::RemoteContentService;
use crate::config::Config;
use crate::error::RemoteError;

/// HTTP client for the remote content service
#[derive(Clone)]
pub struct HttpContentService {
  client: Client,
  base: Url,
}

impl HttpContentService {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;

    let client = Client::builder()
      .timeout(Duration::from_millis(config.remote.timeout_ms))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  /// Join path segments onto the base url, escaping each one.
  fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| RemoteError::Invalid(format!("{} cannot be a base url", self.base)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RemoteError> {
    let url = self.endpoint(segments)?;
    let response = check(self.client.get(url).send().await?)?;
    Ok(response.json().await?)
  }
}

/// Map non-2xx responses to `RemoteError::Status`.
fn check(response: Response) -> Result<Response, RemoteError> {
  let status = response.status();
  if status.is_success() {
    Ok(response)
  } else {
    Err(RemoteError::Status {
      status: status.as_u16(),
    })
  }
}

#[async_trait]
impl RemoteContentService for HttpContentService {
  async fn get_course(&self, course_id: &str) -> Result<ApiCourse, RemoteError> {
    self.get_json(&["api", "courses", course_id]).await
  }

  async fn get_courses(&self) -> Result<Vec<ApiCourse>, RemoteError> {
    self.get_json(&["api", "courses"]).await
  }

  async fn get_all_sections(&self, course_id: &str) -> Result<Vec<ApiSection>, RemoteError> {
    self
      .get_json(&["api", "courses", course_id, "sections"])
      .await
  }

  async fn get_section(&self, section_id: &str) -> Result<ApiSection, RemoteError> {
    self.get_json(&["api", "sections", section_id]).await
  }

  async fn get_lectures_in_section(&self, section_id: &str) -> Result<Vec<ApiLecture>, RemoteError> {
    self
      .get_json(&["api", "lectures", "section", section_id])
      .await
  }

  async fn get_exercises_in_section(
    &self,
    section_id: &str,
  ) -> Result<Vec<ApiExercise>, RemoteError> {
    self
      .get_json(&["api", "exercises", "section", section_id])
      .await
  }

  async fn get_bucket_image(&self, file_name: &str) -> Result<Vec<u8>, RemoteError> {
    let url = self.endpoint(&["api", "bucket", file_name])?;
    let response = check(self.client.get(url).send().await?)?;
    Ok(response.bytes().await?.to_vec())
  }

  async fn get_subscriptions(&self, user_id: &str) -> Result<Vec<ApiCourse>, RemoteError> {
    self
      .get_json(&["api", "students", user_id, "subscriptions"])
      .await
  }

  async fn subscribe_to_course(&self, user_id: &str, course_id: &str) -> Result<(), RemoteError> {
    let url = self.endpoint(&["api", "courses", course_id, "subscribe"])?;
    let body = serde_json::json!({ "user_id": user_id });
    check(self.client.post(url).json(&body).send().await?)?;
    Ok(())
  }

  async fn unsubscribe_from_course(
    &self,
    user_id: &str,
    course_id: &str,
  ) -> Result<(), RemoteError> {
    let url = self.endpoint(&["api", "courses", course_id, "unsubscribe"])?;
    let body = serde_json::json!({ "user_id": user_id });
    check(self.client.post(url).json(&body).send().await?)?;
    Ok(())
  }

  async fn get_student_info(&self, user_id: &str) -> Result<ApiStudent, RemoteError> {
    self.get_json(&["api", "students", user_id, "info"]).await
  }

  async fn complete_component(
    &self,
    user_id: &str,
    completion: &ApiCompletion,
    token: &str,
  ) -> Result<ApiStudent, RemoteError> {
    let url = self.endpoint(&["api", "students", user_id, "complete"])?;
    let response = check(
      self
        .client
        .patch(url)
        .bearer_auth(token)
        .json(completion)
        .send()
        .await?,
    )?;
    Ok(response.json().await?)
  }
}
