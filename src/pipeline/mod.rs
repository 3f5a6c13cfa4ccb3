// Fixed-cadence generation, alerting and fan-out scheduler

mod scheduler;

pub use scheduler::{Pipeline, PipelineParts, TickReport};

#[cfg(test)]
mod tests;
