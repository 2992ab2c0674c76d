// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod event_stream;
pub mod fleet_api;
pub mod http_response;
pub mod osrm_router;
