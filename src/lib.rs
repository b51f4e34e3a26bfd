pub mod config;
pub mod error;
pub mod light;

pub use config::CycleConfig;
pub use error::LightError;
pub use light::{Phase, TrafficLight};
