//! Scriptable in-memory remote service for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::RemoteError;
use crate::remote::{
  ApiCompletion, ApiCourse, ApiExercise, ApiLecture, ApiSection, ApiStudent,
  RemoteContentService,
};

#[derive(Default)]
pub struct FakeRemote {
  pub courses: Mutex<HashMap<String, ApiCourse>>,
  pub sections: Mutex<HashMap<String, Vec<ApiSection>>>,
  pub lectures: Mutex<HashMap<String, Vec<ApiLecture>>>,
  pub exercises: Mutex<HashMap<String, Vec<ApiExercise>>>,
  pub images: Mutex<HashMap<String, Vec<u8>>>,
  pub subscriptions: Mutex<Vec<String>>,
  pub student: Mutex<Option<ApiStudent>>,
  /// Operation names that fail with a timeout, e.g. "lectures:s1"
  pub failing: Mutex<HashSet<String>>,
  pub offline: Mutex<bool>,
  pub calls: Mutex<Vec<String>>,
}

impl FakeRemote {
  pub fn fail(&self, op: &str) {
    self.failing.lock().unwrap().insert(op.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    *self.offline.lock().unwrap() = offline;
  }

  pub fn call_count(&self, op: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
  }

  fn enter(&self, op: String) -> Result<(), RemoteError> {
    self.calls.lock().unwrap().push(op.clone());
    if *self.offline.lock().unwrap() || self.failing.lock().unwrap().contains(&op) {
      return Err(RemoteError::Timeout);
    }
    Ok(())
  }

  pub fn course(id: &str) -> ApiCourse {
    serde_json::from_value(serde_json::json!({
      "_id": id,
      "title": format!("Course {id}"),
      "category": "electronics",
      "difficulty": 1,
      "published": true
    }))
    .unwrap()
  }

  pub fn section(id: &str, course_id: &str, components: &[(&str, &str)]) -> ApiSection {
    let components: Vec<_> = components
      .iter()
      .map(|(comp_id, comp_type)| serde_json::json!({ "compId": comp_id, "compType": comp_type }))
      .collect();
    serde_json::from_value(serde_json::json!({
      "_id": id,
      "parentCourse": course_id,
      "title": format!("Section {id}"),
      "components": components,
      "totalPoints": 10 * components.len()
    }))
    .unwrap()
  }

  pub fn lecture(id: &str, section_id: &str, content_type: &str, content: &str) -> ApiLecture {
    serde_json::from_value(serde_json::json!({
      "_id": id,
      "parentSection": section_id,
      "title": format!("Lecture {id}"),
      "contentType": content_type,
      "content": content
    }))
    .unwrap()
  }

  pub fn exercise(id: &str, section_id: &str) -> ApiExercise {
    serde_json::from_value(serde_json::json!({
      "_id": id,
      "parentSection": section_id,
      "question": "2 + 2?",
      "answers": [{ "text": "4", "correct": true }, { "text": "5" }]
    }))
    .unwrap()
  }

  /// Course c1 with S1 = [l1 (image), e1] and S2 = [l2 (video), e2].
  pub fn sample() -> Self {
    let remote = Self::default();
    remote
      .courses
      .lock()
      .unwrap()
      .insert("c1".to_string(), Self::course("c1"));
    remote.sections.lock().unwrap().insert(
      "c1".to_string(),
      vec![
        Self::section("s1", "c1", &[("l1", "lecture"), ("e1", "exercise")]),
        Self::section("s2", "c1", &[("l2", "lecture"), ("e2", "exercise")]),
      ],
    );
    {
      let mut lectures = remote.lectures.lock().unwrap();
      lectures.insert(
        "s1".to_string(),
        vec![Self::lecture("l1", "s1", "image", "board.png")],
      );
      lectures.insert(
        "s2".to_string(),
        vec![Self::lecture("l2", "s2", "video", "soldering")],
      );
    }
    {
      let mut exercises = remote.exercises.lock().unwrap();
      exercises.insert("s1".to_string(), vec![Self::exercise("e1", "s1")]);
      exercises.insert("s2".to_string(), vec![Self::exercise("e2", "s2")]);
    }
    remote
      .images
      .lock()
      .unwrap()
      .insert("board.png".to_string(), vec![0x89, 0x50, 0x4e, 0x47]);
    remote
  }

  /// Record the server keeps; `complete_component` updates it like the real service.
  pub fn set_student(&self, student: serde_json::Value) {
    *self.student.lock().unwrap() = Some(serde_json::from_value(student).unwrap());
  }

  /// Student u1 subscribed to c1 with no attempts yet.
  ///
  /// Subscribing seeds one entry per component, each still on its first attempt.
  pub fn enroll(&self) {
    let entries = |ids: &[(&str, &str)]| -> Vec<serde_json::Value> {
      ids
        .iter()
        .map(|(id, kind)| {
          serde_json::json!({ "compId": id, "compType": kind, "isFirstAttempt": true })
        })
        .collect()
    };
    self.set_student(serde_json::json!({
      "_id": "u1",
      "points": 0,
      "courses": [{
        "courseId": "c1",
        "sections": [
          {
            "sectionId": "s1",
            "totalPoints": 20,
            "components": entries(&[("l1", "lecture"), ("e1", "exercise")])
          },
          {
            "sectionId": "s2",
            "totalPoints": 20,
            "components": entries(&[("l2", "lecture"), ("e2", "exercise")])
          }
        ]
      }]
    }));
  }
}

#[async_trait]
impl RemoteContentService for FakeRemote {
  async fn get_course(&self, course_id: &str) -> Result<ApiCourse, RemoteError> {
    self.enter(format!("course:{course_id}"))?;
    // Suspend once so concurrent callers overlap.
    tokio::task::yield_now().await;
    self
      .courses
      .lock()
      .unwrap()
      .get(course_id)
      .cloned()
      .ok_or(RemoteError::Status { status: 404 })
  }

  async fn get_courses(&self) -> Result<Vec<ApiCourse>, RemoteError> {
    self.enter("courses".to_string())?;
    let mut list: Vec<_> = self.courses.lock().unwrap().values().cloned().collect();
    list.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(list)
  }

  async fn get_all_sections(&self, course_id: &str) -> Result<Vec<ApiSection>, RemoteError> {
    self.enter(format!("sections:{course_id}"))?;
    Ok(
      self
        .sections
        .lock()
        .unwrap()
        .get(course_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn get_section(&self, section_id: &str) -> Result<ApiSection, RemoteError> {
    self.enter(format!("section:{section_id}"))?;
    self
      .sections
      .lock()
      .unwrap()
      .values()
      .flatten()
      .find(|s| s.id == section_id)
      .cloned()
      .ok_or(RemoteError::Status { status: 404 })
  }

  async fn get_lectures_in_section(
    &self,
    section_id: &str,
  ) -> Result<Vec<ApiLecture>, RemoteError> {
    self.enter(format!("lectures:{section_id}"))?;
    Ok(
      self
        .lectures
        .lock()
        .unwrap()
        .get(section_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn get_exercises_in_section(
    &self,
    section_id: &str,
  ) -> Result<Vec<ApiExercise>, RemoteError> {
    self.enter(format!("exercises:{section_id}"))?;
    Ok(
      self
        .exercises
        .lock()
        .unwrap()
        .get(section_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn get_bucket_image(&self, file_name: &str) -> Result<Vec<u8>, RemoteError> {
    self.enter(format!("image:{file_name}"))?;
    self
      .images
      .lock()
      .unwrap()
      .get(file_name)
      .cloned()
      .ok_or(RemoteError::Status { status: 404 })
  }

  async fn get_subscriptions(&self, user_id: &str) -> Result<Vec<ApiCourse>, RemoteError> {
    self.enter(format!("subscriptions:{user_id}"))?;
    let ids = self.subscriptions.lock().unwrap().clone();
    let courses = self.courses.lock().unwrap();
    Ok(ids.iter().filter_map(|id| courses.get(id).cloned()).collect())
  }

  async fn subscribe_to_course(&self, user_id: &str, course_id: &str) -> Result<(), RemoteError> {
    self.enter(format!("subscribe:{user_id}"))?;
    self.subscriptions.lock().unwrap().push(course_id.to_string());
    Ok(())
  }

  async fn unsubscribe_from_course(
    &self,
    user_id: &str,
    course_id: &str,
  ) -> Result<(), RemoteError> {
    self.enter(format!("unsubscribe:{user_id}"))?;
    self.subscriptions.lock().unwrap().retain(|id| id != course_id);
    Ok(())
  }

  async fn get_student_info(&self, user_id: &str) -> Result<ApiStudent, RemoteError> {
    self.enter(format!("student:{user_id}"))?;
    self
      .student
      .lock()
      .unwrap()
      .clone()
      .ok_or(RemoteError::Status { status: 404 })
  }

  async fn complete_component(
    &self,
    user_id: &str,
    completion: &ApiCompletion,
    _token: &str,
  ) -> Result<ApiStudent, RemoteError> {
    self.enter(format!("complete:{user_id}"))?;
    let mut guard = self.student.lock().unwrap();
    let student = guard.as_mut().ok_or(RemoteError::Status { status: 404 })?;

    let entry = student
      .courses
      .iter_mut()
      .flat_map(|c| c.sections.iter_mut())
      .filter(|s| s.section_id == completion.parent_section)
      .flat_map(|s| s.components.iter_mut())
      .find(|c| c.comp_id == completion.comp_id)
      .ok_or(RemoteError::Status { status: 404 })?;

    entry.is_complete |= completion.is_complete;
    entry.is_first_attempt = false;
    entry.points_given += completion.points;
    student.points += completion.points;
    Ok(student.clone())
  }
}
