// Reading model, generation and index calculation
pub mod reading;

// Bounded per-sensor reading history
pub mod history;

// Threshold alert evaluation
pub mod alert;

// Message bus publishing
pub mod bus;

// Alert store, time-series store, sensor registry and cache
pub mod store;

// Subscription management
pub mod subscription;

// Fan-out scheduler
pub mod pipeline;

// Read-side queries
pub mod query;

// HTTP and WebSocket APIs
pub mod api;

// Configuration
pub mod config;
