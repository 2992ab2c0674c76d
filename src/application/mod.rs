// Application layer - Engines, live state and use cases
pub mod alert_state;
pub mod cluster_index;
#[cfg(test)]
pub mod fakes;
pub mod fleet_repository;
pub mod fleet_service;
pub mod fleet_state;
pub mod kdtree;
pub mod live_merger;
pub mod ranking;
pub mod route_provider;
pub mod service_centers;
