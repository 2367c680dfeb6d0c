use std::sync::Arc;

use crate::http_client::HttpClient;
use crate::settings::{InMemoryDocument, SettingsEndpoint, SettingsWatcher};
use crate::store::ConfigStore;

// app's shared state
pub struct AppState {
    pub client: Arc<HttpClient>,
    pub store: Arc<ConfigStore>,
    pub document: Arc<InMemoryDocument>,
    pub watcher: Arc<SettingsWatcher<SettingsEndpoint>>,
}
