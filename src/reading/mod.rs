// Reading model, synthetic generation and index calculation

mod generator;
mod index;
mod model;

pub use generator::{round2, time_of_day_multiplier, Baseline, Jitter, ReadingGenerator};
pub use index::{composite_index, AirQualityCategory, CategoryInfo};
pub use model::{default_sensors, Reading, ReadingData, Sensor};
