use chrono::{DateTime, Utc};

/// Clock used for download timestamps and expiry checks.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
  #[default]
  System,
  Fixed(DateTime<Utc>),
}

impl Clock {
  /// Clock pinned to the given instant.
  pub fn fixed(at: DateTime<Utc>) -> Self {
    Self::Fixed(at)
  }

  pub fn now(&self) -> DateTime<Utc> {
    match self {
      Clock::System => Utc::now(),
      Clock::Fixed(t) => *t,
    }
  }
}

#[cfg(test)]
pub(crate) fn fixed_now() -> DateTime<Utc> {
  // 2023-11-14T22:13:20Z
  DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid fixed timestamp")
}
