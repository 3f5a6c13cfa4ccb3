// Read-side queries over history, stores and the subscriber registry

mod service;

pub use service::{
    ActiveAlert, HealthInfo, HistoricalData, QueryError, QueryService, ACTIVE_ALERT_TYPE,
    DEFAULT_HISTORY_HOURS, DEFAULT_HISTORY_LIMIT,
};
