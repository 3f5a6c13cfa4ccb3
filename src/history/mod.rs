// Per-sensor rolling reading history

mod buffer;

pub use buffer::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
