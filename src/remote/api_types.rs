//! Serde types matching the remote content service's JSON payloads.
//!
//! These types are separate from domain types so the wire shape (`_id`,
//! camelCase, optional fields) stays at the boundary. Conversion into the
//! domain validates the payload; a failure there is a `RemoteError::Invalid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::model::{
  Answer, ComponentKind, ComponentProgress, ComponentRef, Course, CourseProgress, Exercise,
  Lecture, LectureMedia, Section, SectionProgress, StudentProgressRecord,
};

// ============================================================================
// Content
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCourse {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  pub estimated_hours: Option<f64>,
  pub difficulty: Option<u8>,
  #[serde(default)]
  pub published: bool,
  #[serde(default)]
  pub status: String,
  pub rating: Option<f64>,
  pub date_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiComponentRef {
  pub comp_id: String,
  pub comp_type: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSection {
  #[serde(rename = "_id")]
  pub id: String,
  pub parent_course: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub components: Vec<ApiComponentRef>,
  #[serde(default)]
  pub total_points: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLecture {
  #[serde(rename = "_id")]
  pub id: String,
  pub parent_section: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  /// "video", "image" or "text"
  pub content_type: String,
  /// File name for media lectures, body for text lectures
  #[serde(default)]
  pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAnswer {
  pub text: String,
  #[serde(default)]
  pub correct: bool,
  pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExercise {
  #[serde(rename = "_id")]
  pub id: String,
  pub parent_section: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub question: String,
  #[serde(default)]
  pub answers: Vec<ApiAnswer>,
}

// ============================================================================
// Student
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStudentComponent {
  pub comp_id: String,
  pub comp_type: String,
  #[serde(default)]
  pub is_complete: bool,
  #[serde(default)]
  pub is_first_attempt: bool,
  #[serde(default)]
  pub points_given: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStudentSection {
  pub section_id: String,
  #[serde(default)]
  pub is_complete: bool,
  #[serde(default)]
  pub total_points: u32,
  #[serde(default)]
  pub components: Vec<ApiStudentComponent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStudentCourse {
  pub course_id: String,
  #[serde(default)]
  pub is_complete: bool,
  #[serde(default)]
  pub sections: Vec<ApiStudentSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStudent {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub points: u32,
  #[serde(default)]
  pub courses: Vec<ApiStudentCourse>,
}

/// Body of a completion submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCompletion {
  pub comp_id: String,
  pub parent_section: String,
  pub comp_type: ComponentKind,
  pub is_complete: bool,
  pub points: u32,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

fn require_id(kind: &str, id: &str) -> Result<(), RemoteError> {
  if id.trim().is_empty() {
    return Err(RemoteError::Invalid(format!("{} without identifier", kind)));
  }
  Ok(())
}

fn parse_kind(raw: &str) -> Result<ComponentKind, RemoteError> {
  match raw.to_ascii_lowercase().as_str() {
    "lecture" => Ok(ComponentKind::Lecture),
    "exercise" => Ok(ComponentKind::Exercise),
    other => Err(RemoteError::Invalid(format!(
      "unknown component type '{}'",
      other
    ))),
  }
}

impl ApiCourse {
  pub fn into_course(self) -> Result<Course, RemoteError> {
    require_id("course", &self.id)?;
    let difficulty = match self.difficulty {
      None => 1,
      Some(d @ 1..=3) => d,
      Some(d) => {
        return Err(RemoteError::Invalid(format!(
          "course {} has difficulty {}",
          self.id, d
        )))
      }
    };

    Ok(Course {
      course_id: self.id,
      title: self.title,
      description: self.description,
      category: self.category,
      estimated_hours: self.estimated_hours.unwrap_or_default(),
      difficulty,
      published: self.published,
      status: self.status,
      rating: self.rating,
      date_updated: self.date_updated,
    })
  }
}

impl ApiSection {
  pub fn into_section(self) -> Result<Section, RemoteError> {
    require_id("section", &self.id)?;
    let components = self
      .components
      .into_iter()
      .map(|c| {
        require_id("component", &c.comp_id)?;
        Ok(ComponentRef {
          kind: parse_kind(&c.comp_type)?,
          component_id: c.comp_id,
        })
      })
      .collect::<Result<Vec<_>, RemoteError>>()?;

    Ok(Section {
      section_id: self.id,
      parent_course_id: self.parent_course,
      title: self.title,
      description: self.description,
      components,
      total_points: self.total_points,
    })
  }
}

impl ApiLecture {
  pub fn into_lecture(self) -> Result<Lecture, RemoteError> {
    require_id("lecture", &self.id)?;
    let media = match self.content_type.to_ascii_lowercase().as_str() {
      "video" => LectureMedia::Video {
        file_name: self.content,
      },
      "image" => LectureMedia::Image {
        file_name: self.content,
      },
      "text" => LectureMedia::Text {
        content: self.content,
      },
      other => {
        return Err(RemoteError::Invalid(format!(
          "lecture {} has content type '{}'",
          self.id, other
        )))
      }
    };
    if let LectureMedia::Video { file_name } | LectureMedia::Image { file_name } = &media {
      if file_name.is_empty() {
        return Err(RemoteError::Invalid(format!(
          "lecture {} has no media file",
          self.id
        )));
      }
    }

    Ok(Lecture {
      lecture_id: self.id,
      section_id: self.parent_section,
      title: self.title,
      description: self.description,
      media,
    })
  }
}

impl ApiExercise {
  pub fn into_exercise(self) -> Result<Exercise, RemoteError> {
    require_id("exercise", &self.id)?;
    Ok(Exercise {
      exercise_id: self.id,
      section_id: self.parent_section,
      title: self.title,
      question: self.question,
      answers: self
        .answers
        .into_iter()
        .map(|a| Answer {
          text: a.text,
          correct: a.correct,
          feedback: a.feedback,
        })
        .collect(),
    })
  }
}

impl ApiStudent {
  pub fn into_record(self) -> Result<StudentProgressRecord, RemoteError> {
    require_id("student", &self.id)?;
    let courses = self
      .courses
      .into_iter()
      .map(|course| {
        let sections = course
          .sections
          .into_iter()
          .map(|section| {
            let components = section
              .components
              .into_iter()
              .map(|c| {
                Ok(ComponentProgress {
                  kind: parse_kind(&c.comp_type)?,
                  component_id: c.comp_id,
                  is_complete: c.is_complete,
                  is_first_attempt: c.is_first_attempt,
                  points: c.points_given,
                })
              })
              .collect::<Result<Vec<_>, RemoteError>>()?;
            Ok(SectionProgress {
              section_id: section.section_id,
              is_complete: section.is_complete,
              total_points: section.total_points,
              components,
            })
          })
          .collect::<Result<Vec<_>, RemoteError>>()?;
        Ok(CourseProgress {
          course_id: course.course_id,
          is_complete: course.is_complete,
          sections,
        })
      })
      .collect::<Result<Vec<_>, RemoteError>>()?;

    Ok(StudentProgressRecord {
      student_id: self.id,
      points: self.points,
      courses,
    })
  }
}

/// Normalize every element of a list, failing on the first invalid one.
pub fn normalize_all<A, T>(
  items: Vec<A>,
  f: impl Fn(A) -> Result<T, RemoteError>,
) -> Result<Vec<T>, RemoteError> {
  items.into_iter().map(f).collect()
}
