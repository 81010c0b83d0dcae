//! Typed keys into the durable store.

use std::fmt;

/// Every key this layer reads or writes.
///
/// `storage_key` produces the persisted string form; nothing else in the crate
/// builds key strings by hand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
  /// All published courses
  CourseList,
  /// A single course record
  Course { course_id: String },
  /// Courses the user is subscribed to
  Subscriptions { user_id: String },
  /// Full offline mirror of a course for one user
  DownloadedCourse { course_id: String, user_id: String },
  /// Sections of a course
  Sections { course_id: String },
  /// A single section
  Section { section_id: String },
  /// Lectures of a section
  Lectures { section_id: String },
  /// Exercises of a section
  Exercises { section_id: String },
  /// Image payload of a lecture
  Image { lecture_id: String },
  /// The student's progress record
  StudentRecord,
  // Session values written by the authentication collaborator.
  UserId,
  UserInfo,
  LoginToken,
}

impl CacheKey {
  pub fn course(course_id: &str) -> Self {
    Self::Course {
      course_id: course_id.to_string(),
    }
  }

  pub fn subscriptions(user_id: &str) -> Self {
    Self::Subscriptions {
      user_id: user_id.to_string(),
    }
  }

  pub fn downloaded_course(course_id: &str, user_id: &str) -> Self {
    Self::DownloadedCourse {
      course_id: course_id.to_string(),
      user_id: user_id.to_string(),
    }
  }

  pub fn sections(course_id: &str) -> Self {
    Self::Sections {
      course_id: course_id.to_string(),
    }
  }

  pub fn section(section_id: &str) -> Self {
    Self::Section {
      section_id: section_id.to_string(),
    }
  }

  pub fn lectures(section_id: &str) -> Self {
    Self::Lectures {
      section_id: section_id.to_string(),
    }
  }

  pub fn exercises(section_id: &str) -> Self {
    Self::Exercises {
      section_id: section_id.to_string(),
    }
  }

  pub fn image(lecture_id: &str) -> Self {
    Self::Image {
      lecture_id: lecture_id.to_string(),
    }
  }

  /// The string stored in the key column.
  pub fn storage_key(&self) -> String {
    match self {
      Self::CourseList => "@courseList".to_string(),
      Self::Course { course_id } => format!("C{}", course_id),
      Self::Subscriptions { user_id } => format!("@subCourseList{}", user_id),
      Self::DownloadedCourse { course_id, user_id } => format!("{}{}", course_id, user_id),
      Self::Sections { course_id } => format!("S{}", course_id),
      Self::Section { section_id } => format!("SEC{}", section_id),
      Self::Lectures { section_id } => format!("L{}", section_id),
      Self::Exercises { section_id } => format!("E{}", section_id),
      Self::Image { lecture_id } => format!("I{}", lecture_id),
      Self::StudentRecord => "@studentInfo".to_string(),
      Self::UserId => "@userId".to_string(),
      Self::UserInfo => "@userInfo".to_string(),
      Self::LoginToken => "@loginToken".to_string(),
    }
  }

  /// Recover the course id from a raw key if it is a download key for `user_id`.
  ///
  /// Session and list keys start with `@` and are never download keys.
  pub fn parse_downloaded_course(raw: &str, user_id: &str) -> Option<Self> {
    if raw.starts_with('@') || user_id.is_empty() {
      return None;
    }
    let course_id = raw.strip_suffix(user_id)?;
    if course_id.is_empty() {
      return None;
    }
    Some(Self::downloaded_course(course_id, user_id))
  }

  /// Human readable description for logs.
  pub fn description(&self) -> String {
    match self {
      Self::CourseList => "course list".to_string(),
      Self::Course { course_id } => format!("course {}", course_id),
      Self::Subscriptions { user_id } => format!("subscriptions of {}", user_id),
      Self::DownloadedCourse { course_id, .. } => format!("downloaded course {}", course_id),
      Self::Sections { course_id } => format!("sections of course {}", course_id),
      Self::Section { section_id } => format!("section {}", section_id),
      Self::Lectures { section_id } => format!("lectures of section {}", section_id),
      Self::Exercises { section_id } => format!("exercises of section {}", section_id),
      Self::Image { lecture_id } => format!("image of lecture {}", lecture_id),
      Self::StudentRecord => "student record".to_string(),
      Self::UserId => "user id".to_string(),
      Self::UserInfo => "user info".to_string(),
      Self::LoginToken => "login token".to_string(),
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.storage_key())
  }
}
