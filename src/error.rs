use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LightError {
  #[error("Traffic light is already running")]
  AlreadyRunning,
  #[error("Traffic light has been stopped")]
  Stopped,
}
