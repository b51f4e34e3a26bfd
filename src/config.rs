use std::time::Duration;

/// Bounds for the randomized cycle duration. `max` is exclusive and must be
/// strictly greater than `min`.
#[derive(Clone)]
pub struct CycleConfig {
  pub min: Duration,
  pub max: Duration,
}

impl Default for CycleConfig {
  fn default() -> Self {
    Self {
      min: Duration::from_secs(4),
      max: Duration::from_secs(6),
    }
  }
}
