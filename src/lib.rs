pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http_client;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod request_manager;
pub mod settings;
pub mod state;
pub mod store;
pub mod throttle;
pub mod worker;

pub use error::{RequestError, SettingsError};
pub use http_client::{HttpClient, RequestOptions};
pub use models::QueueStatus;
pub use request_manager::{BatchItem, RequestManager};
