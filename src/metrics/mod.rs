pub mod engine;
pub mod rent;

pub use engine::{MetricEngine, MetricStats};
