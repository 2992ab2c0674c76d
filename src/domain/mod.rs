// Domain layer - Fleet models with no I/O
pub mod cluster;
pub mod dashboard;
pub mod error;
pub mod event_log;
pub mod geo;
pub mod notification;
pub mod service_center;
pub mod station;
pub mod view_mode;
