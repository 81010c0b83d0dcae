//! Mirrored media: image payloads stored inline, videos handed to a transfer queue.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

/// An image fetched from the remote bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
  pub file_name: String,
  pub mime_type: String,
  #[serde(with = "hex_bytes")]
  pub data: Vec<u8>,
  /// Hex SHA-256 of `data`, checked when the payload is read back
  pub sha256: String,
}

impl ImagePayload {
  pub fn new(file_name: &str, data: Vec<u8>) -> Self {
    Self {
      file_name: file_name.to_string(),
      mime_type: mime_type_for(file_name).to_string(),
      sha256: digest(&data),
      data,
    }
  }

  /// True when the stored bytes still match their digest.
  pub fn verify(&self) -> bool {
    digest(&self.data) == self.sha256
  }
}

fn digest(data: &[u8]) -> String {
  hex::encode(Sha256::digest(data))
}

/// MIME type derived from the file extension; files without one are PNG.
pub fn mime_type_for(file_name: &str) -> &'static str {
  let ext = match file_name.rsplit_once('.') {
    Some((_, ext)) => ext.to_ascii_lowercase(),
    None => return "image/png",
  };
  match ext.as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "svg" => "image/svg+xml",
    _ => "image/png",
  }
}

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(serde::de::Error::custom)
  }
}

/// A video the host should transfer separately after a course download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
  pub course_id: String,
  pub lecture_id: String,
  pub file_name: String,
}

/// Sending half of the video transfer queue.
#[derive(Debug, Clone)]
pub struct VideoQueue {
  tx: mpsc::UnboundedSender<VideoJob>,
}

impl VideoQueue {
  /// Create a queue and the receiver the transfer mechanism drains.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<VideoJob>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  /// Enqueue a job. Returns false if the receiver is gone.
  pub fn enqueue(&self, job: VideoJob) -> bool {
    self.tx.send(job).is_ok()
  }
}
