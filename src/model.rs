//! Domain types for course content and student progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Course summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
  pub course_id: String,
  pub title: String,
  pub description: String,
  pub category: String,
  pub estimated_hours: f64,
  /// 1 = beginner, 2 = intermediate, 3 = advanced
  pub difficulty: u8,
  pub published: bool,
  pub status: String,
  pub rating: Option<f64>,
  pub date_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
  Lecture,
  Exercise,
}

/// Reference from a section to one of its components, in section order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
  pub component_id: String,
  pub kind: ComponentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
  pub section_id: String,
  pub parent_course_id: String,
  pub title: String,
  pub description: String,
  pub components: Vec<ComponentRef>,
  pub total_points: u32,
}

/// Media attached to a lecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LectureMedia {
  Video { file_name: String },
  Image { file_name: String },
  Text { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
  pub lecture_id: String,
  pub section_id: String,
  pub title: String,
  pub description: String,
  pub media: LectureMedia,
}

impl Lecture {
  /// File name of the image to mirror eagerly, if this is an image lecture.
  pub fn image_file(&self) -> Option<&str> {
    match &self.media {
      LectureMedia::Image { file_name } => Some(file_name),
      _ => None,
    }
  }

  pub fn video_file(&self) -> Option<&str> {
    match &self.media {
      LectureMedia::Video { file_name } => Some(file_name),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
  pub text: String,
  pub correct: bool,
  pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
  pub exercise_id: String,
  pub section_id: String,
  pub title: String,
  pub question: String,
  pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentContent {
  Lecture(Lecture),
  Exercise(Exercise),
}

/// A lecture or exercise placed at its position within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
  pub position: usize,
  pub content: ComponentContent,
}

impl Component {
  pub fn component_id(&self) -> &str {
    match &self.content {
      ComponentContent::Lecture(l) => &l.lecture_id,
      ComponentContent::Exercise(e) => &e.exercise_id,
    }
  }

  pub fn section_id(&self) -> &str {
    match &self.content {
      ComponentContent::Lecture(l) => &l.section_id,
      ComponentContent::Exercise(e) => &e.section_id,
    }
  }

  pub fn kind(&self) -> ComponentKind {
    match &self.content {
      ComponentContent::Lecture(_) => ComponentKind::Lecture,
      ComponentContent::Exercise(_) => ComponentKind::Exercise,
    }
  }
}

// ============================================================================
// Student progress
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentProgress {
  pub component_id: String,
  pub kind: ComponentKind,
  pub is_complete: bool,
  pub is_first_attempt: bool,
  pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
  pub section_id: String,
  pub is_complete: bool,
  pub total_points: u32,
  pub components: Vec<ComponentProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
  pub course_id: String,
  pub is_complete: bool,
  pub sections: Vec<SectionProgress>,
}

/// The server's authoritative record of a student's progress.
///
/// Only ever replaced as a whole with what the remote service returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProgressRecord {
  pub student_id: String,
  pub points: u32,
  pub courses: Vec<CourseProgress>,
}

impl StudentProgressRecord {
  pub fn course(&self, course_id: &str) -> Option<&CourseProgress> {
    self.courses.iter().find(|c| c.course_id == course_id)
  }

  pub fn section(&self, course_id: &str, section_id: &str) -> Option<&SectionProgress> {
    self
      .course(course_id)?
      .sections
      .iter()
      .find(|s| s.section_id == section_id)
  }

  /// The entry for a component within a known course and section.
  pub fn component(
    &self,
    course_id: &str,
    section_id: &str,
    component_id: &str,
  ) -> Option<&ComponentProgress> {
    self
      .section(course_id, section_id)?
      .components
      .iter()
      .find(|c| c.component_id == component_id)
  }

  /// Every entry for `component_id`, across all courses and sections.
  pub fn component_entries<'a>(
    &'a self,
    component_id: &'a str,
  ) -> impl Iterator<Item = &'a ComponentProgress> + 'a {
    self
      .courses
      .iter()
      .flat_map(|c| c.sections.iter())
      .flat_map(|s| s.components.iter())
      .filter(move |p| p.component_id == component_id)
  }
}

// ============================================================================
// Offline mirror
// ============================================================================

/// Everything mirrored for one section of a downloaded course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMirror {
  pub section: Section,
  pub lectures: Vec<Lecture>,
  pub exercises: Vec<Exercise>,
}

/// A fully downloaded course, stored under the course+user key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedCourse {
  pub course_id: String,
  pub user_id: String,
  pub course: Course,
  pub sections: Vec<SectionMirror>,
  /// Lectures whose image payload is stored under its own key.
  pub image_lectures: Vec<String>,
  pub downloaded_at: DateTime<Utc>,
}
