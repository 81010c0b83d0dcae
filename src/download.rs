//! Full-course downloads for offline use, with expiry of old mirrors.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::cache::{set_op, CacheKey, CacheLayer, WriteOp};
use crate::error::CacheError;
use crate::media::{ImagePayload, VideoJob, VideoQueue};
use crate::model::{DownloadedCourse, Section, SectionMirror};
use crate::remote::api_types::normalize_all;
use crate::remote::RemoteContentService;
use crate::time::Clock;

const MS_PER_DAY: f64 = 86_400_000.0;

type InFlight = Arc<Mutex<HashMap<String, Shared<BoxFuture<'static, bool>>>>>;

/// Downloads whole courses into the store and manages the downloaded set.
///
/// A course is either fully mirrored or not mirrored at all. Concurrent
/// downloads of the same course share one in-flight attempt; different
/// courses download independently.
#[derive(Clone)]
pub struct DownloadManager {
  inner: Arc<Downloader>,
  in_flight: InFlight,
}

struct Downloader {
  remote: Arc<dyn RemoteContentService>,
  cache: CacheLayer,
  user_id: String,
  clock: Clock,
  retention_days: u32,
  videos: Option<VideoQueue>,
}

/// Everything fetched for a course, ready to be committed in one batch.
struct StagedDownload {
  entry: DownloadedCourse,
  images: Vec<(String, ImagePayload)>,
  videos: Vec<VideoJob>,
}

impl DownloadManager {
  pub fn new(
    remote: Arc<dyn RemoteContentService>,
    cache: CacheLayer,
    user_id: &str,
    clock: Clock,
    retention_days: u32,
    videos: Option<VideoQueue>,
  ) -> Self {
    Self {
      inner: Arc::new(Downloader {
        remote,
        cache,
        user_id: user_id.to_string(),
        clock,
        retention_days,
        videos,
      }),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Download the course subtree. Returns false if any part failed, in which
  /// case the course is not marked as downloaded.
  pub async fn download_course(&self, course_id: &str) -> bool {
    let attempt = {
      let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
      match in_flight.get(course_id) {
        Some(existing) => {
          debug!(course_id = %course_id, "joining in-flight download");
          existing.clone()
        }
        None => {
          let inner = Arc::clone(&self.inner);
          let registry = Arc::clone(&self.in_flight);
          let id = course_id.to_string();
          let attempt = async move {
            let ok = inner.download(&id).await;
            registry
              .lock()
              .unwrap_or_else(PoisonError::into_inner)
              .remove(&id);
            ok
          }
          .boxed()
          .shared();
          in_flight.insert(course_id.to_string(), attempt.clone());
          attempt
        }
      }
    };

    attempt.await
  }

  /// True iff the course's top-level download entry exists.
  pub fn is_course_downloaded(&self, course_id: &str) -> bool {
    let key = self.inner.download_key(course_id);
    match self.inner.cache.contains(&key) {
      Ok(found) => found,
      Err(e) => {
        warn!(course_id = %course_id, error = %e, "failed to check download state");
        false
      }
    }
  }

  /// The stored mirror of a course, if it is downloaded and readable.
  pub fn downloaded_course(&self, course_id: &str) -> Result<Option<DownloadedCourse>, CacheError> {
    let key = self.inner.download_key(course_id);
    Ok(self.inner.cache.load(&key)?.map(|c| c.value))
  }

  /// Remove a downloaded course and every mirror key it references.
  pub fn delete_course(&self, course_id: &str) -> Result<(), CacheError> {
    self.inner.delete(course_id)
  }

  /// Downloaded courses of the current user, evicting expired ones.
  pub fn list_downloaded_courses(&self) -> Result<Vec<DownloadedCourse>, CacheError> {
    self.inner.list()
  }
}

impl Downloader {
  fn download_key(&self, course_id: &str) -> CacheKey {
    CacheKey::downloaded_course(course_id, &self.user_id)
  }

  async fn download(&self, course_id: &str) -> bool {
    let result = match self.fetch(course_id).await {
      Ok(staged) => self.commit(staged),
      Err(e) => Err(e),
    };

    match result {
      Ok(()) => {
        info!(course_id = %course_id, "course downloaded");
        true
      }
      Err(e) => {
        warn!(course_id = %course_id, error = %e, "course download failed, rolling back");
        if let Err(e) = self.cache.remove(&self.download_key(course_id)) {
          warn!(course_id = %course_id, error = %e, "failed to remove download entry");
        }
        false
      }
    }
  }

  /// Pull the course, its sections, their lectures and exercises, and images.
  async fn fetch(&self, course_id: &str) -> Result<StagedDownload, CacheError> {
    let course = self.remote.get_course(course_id).await?.into_course()?;
    let sections: Vec<Section> = normalize_all(
      self.remote.get_all_sections(course_id).await?,
      |s| s.into_section(),
    )?;

    let mut mirrors = Vec::with_capacity(sections.len());
    let mut images = Vec::new();
    let mut videos = Vec::new();

    for section in sections {
      let lectures = normalize_all(
        self
          .remote
          .get_lectures_in_section(&section.section_id)
          .await?,
        |l| l.into_lecture(),
      )?;
      let exercises = normalize_all(
        self
          .remote
          .get_exercises_in_section(&section.section_id)
          .await?,
        |e| e.into_exercise(),
      )?;

      for lecture in &lectures {
        if let Some(file_name) = lecture.image_file() {
          let bytes = self.remote.get_bucket_image(file_name).await?;
          images.push((lecture.lecture_id.clone(), ImagePayload::new(file_name, bytes)));
        } else if let Some(file_name) = lecture.video_file() {
          videos.push(VideoJob {
            course_id: course_id.to_string(),
            lecture_id: lecture.lecture_id.clone(),
            file_name: file_name.to_string(),
          });
        }
      }

      mirrors.push(SectionMirror {
        section,
        lectures,
        exercises,
      });
    }

    let entry = DownloadedCourse {
      course_id: course_id.to_string(),
      user_id: self.user_id.clone(),
      course,
      image_lectures: images.iter().map(|(id, _)| id.clone()).collect(),
      sections: mirrors,
      downloaded_at: self.clock.now(),
    };

    Ok(StagedDownload {
      entry,
      images,
      videos,
    })
  }

  /// Write every key of the download in one atomic batch, top-level key last.
  fn commit(&self, staged: StagedDownload) -> Result<(), CacheError> {
    let entry = &staged.entry;
    let sections: Vec<&Section> = entry.sections.iter().map(|m| &m.section).collect();

    let mut ops = vec![
      set_op(&CacheKey::course(&entry.course_id), &entry.course)?,
      set_op(&CacheKey::sections(&entry.course_id), &sections)?,
    ];
    for mirror in &entry.sections {
      let section_id = &mirror.section.section_id;
      ops.push(set_op(&CacheKey::section(section_id), &mirror.section)?);
      ops.push(set_op(&CacheKey::lectures(section_id), &mirror.lectures)?);
      ops.push(set_op(&CacheKey::exercises(section_id), &mirror.exercises)?);
    }
    for (lecture_id, image) in &staged.images {
      ops.push(set_op(&CacheKey::image(lecture_id), image)?);
    }
    ops.push(set_op(&self.download_key(&entry.course_id), entry)?);

    self.cache.write_batch(&ops)?;

    if let Some(queue) = &self.videos {
      for job in staged.videos {
        let lecture_id = job.lecture_id.clone();
        if !queue.enqueue(job) {
          warn!(lecture_id = %lecture_id, "video queue closed, skipping transfer");
        }
      }
    }
    Ok(())
  }

  /// True if another user on this store has a download entry for `course_id`.
  fn shared_with_other_user(&self, course_id: &str) -> Result<bool, CacheError> {
    for raw in self.cache.store().keys()? {
      if raw.starts_with('@') {
        continue;
      }
      let Some(user_id) = raw.strip_prefix(course_id) else {
        continue;
      };
      if user_id.is_empty() || user_id == self.user_id {
        continue;
      }
      let key = CacheKey::downloaded_course(course_id, user_id);
      match self.cache.load::<DownloadedCourse>(&key) {
        Ok(Some(cached))
          if cached.value.course_id == course_id && cached.value.user_id == user_id =>
        {
          return Ok(true);
        }
        Ok(_) | Err(CacheError::CorruptEntry { .. }) => {}
        Err(e) => return Err(e),
      }
    }
    Ok(false)
  }

  /// Remove the user's download entry and, unless another user's entry for
  /// the same course still needs them, the mirrored content keys.
  fn delete(&self, course_id: &str) -> Result<(), CacheError> {
    let key = self.download_key(course_id);
    if self.shared_with_other_user(course_id)? {
      self.cache.remove(&key)?;
      debug!(course_id = %course_id, "download entry removed, content kept for other users");
      return Ok(());
    }

    let mut ops = vec![
      WriteOp::Remove {
        key: key.storage_key(),
      },
      WriteOp::Remove {
        key: CacheKey::sections(course_id).storage_key(),
      },
      WriteOp::Remove {
        key: CacheKey::course(course_id).storage_key(),
      },
    ];

    // A corrupt entry still gets its top-level key removed.
    let entry = match self.cache.load::<DownloadedCourse>(&key) {
      Ok(entry) => entry.map(|c| c.value),
      Err(CacheError::CorruptEntry { .. }) => None,
      Err(e) => return Err(e),
    };
    if let Some(entry) = entry {
      for mirror in &entry.sections {
        let section_id = &mirror.section.section_id;
        for key in [
          CacheKey::section(section_id),
          CacheKey::lectures(section_id),
          CacheKey::exercises(section_id),
        ] {
          ops.push(WriteOp::Remove {
            key: key.storage_key(),
          });
        }
      }
      for lecture_id in &entry.image_lectures {
        ops.push(WriteOp::Remove {
          key: CacheKey::image(lecture_id).storage_key(),
        });
      }
    }

    self.cache.write_batch(&ops)?;
    debug!(course_id = %course_id, "downloaded course removed");
    Ok(())
  }

  fn list(&self) -> Result<Vec<DownloadedCourse>, CacheError> {
    let now = self.clock.now();
    let mut courses = Vec::new();

    for raw in self.cache.store().keys()? {
      let Some(key) = CacheKey::parse_downloaded_course(&raw, &self.user_id) else {
        continue;
      };
      let CacheKey::DownloadedCourse { course_id, .. } = &key else {
        continue;
      };

      let mut entry = match self.cache.load::<DownloadedCourse>(&key) {
        Ok(Some(cached)) => cached.value,
        Ok(None) | Err(CacheError::CorruptEntry { .. }) => continue,
        Err(e) => return Err(e),
      };
      if entry.user_id != self.user_id {
        continue;
      }

      let age_days = (now - entry.downloaded_at).num_milliseconds() as f64 / MS_PER_DAY;
      if age_days > f64::from(self.retention_days) {
        info!(course_id = %course_id, age_days, "evicting expired download");
        self.delete(course_id)?;
        continue;
      }

      // Mirror entries are addressed by the key's course id.
      entry.course_id = course_id.clone();
      entry.course.course_id = course_id.clone();
      courses.push(entry);
    }

    courses.sort_by(|a, b| a.course_id.cmp(&b.course_id));
    Ok(courses)
  }
}
