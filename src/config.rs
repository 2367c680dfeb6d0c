use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "panel-client")]
#[command(about = "Request coordinator and settings watcher for the admin panel backend")]
pub struct Args {
    // Port for the diagnostics server
    #[arg(short, long, env = "PANEL_PORT", default_value_t = 8080)]
    pub port: u16,

    // Backend base url, e.g. "https://admin.example.com/api"
    #[arg(short = 'u', long, env = "PANEL_API_BASE_URL", default_value = "http://localhost:3000/api")]
    pub api_base_url: String,

    // Max requests in flight at once
    #[arg(short = 'c', long, env = "PANEL_MAX_CONCURRENT", default_value_t = 6)]
    pub max_concurrent: usize,

    // Per-call transport timeout in seconds
    #[arg(long, env = "PANEL_REQUEST_TIMEOUT", default_value_t = 15)]
    pub request_timeout: u64,

    // Requests slower than this get logged
    #[arg(long, env = "PANEL_SLOW_REQUEST_MS", default_value_t = 3000)]
    pub slow_request_ms: u64,

    // Persisted auth record
    #[arg(long, env = "PANEL_AUTH_FILE", default_value = "auth.json")]
    pub auth_file: PathBuf,

    // Where the app goes after a 401
    #[arg(long, env = "PANEL_LOGIN_PATH", default_value = "/login")]
    pub login_path: String,

    // Settings endpoint, relative to the base url
    #[arg(long, env = "PANEL_SETTINGS_PATH", default_value = "/settings")]
    pub settings_path: String,

    // Settings poll interval while visible, seconds
    #[arg(long, default_value_t = 120)]
    pub poll_visible: u64,

    // Settings poll interval while backgrounded, seconds
    #[arg(long, default_value_t = 600)]
    pub poll_hidden: u64,

    // Hidden longer than this forces a refetch on return, seconds
    #[arg(long, default_value_t = 300)]
    pub hidden_refetch: u64,

    // Trailing window for coalesced global refreshes
    #[arg(long, default_value_t = 1000)]
    pub refresh_window_ms: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub port: u16,
    pub api_base_url: String,
    pub max_concurrent: usize,
    pub request_timeout: Duration,
    pub slow_request_threshold: Duration,
    pub auth_file: PathBuf,
    pub login_path: String,
    pub settings_path: String,
    pub watcher: WatcherConfig,
    pub refresh_window: Duration,
    pub log_level: String,
    pub json_logs: bool,
}

// Timing policy for the settings watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub visible_interval: Duration,
    pub hidden_interval: Duration,
    pub hidden_refetch_threshold: Duration,
    pub poll_priority: i32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            visible_interval: Duration::from_secs(120),
            hidden_interval: Duration::from_secs(600),
            hidden_refetch_threshold: Duration::from_secs(300),
            poll_priority: 3,
        }
    }
}

impl From<Args> for PanelConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            api_base_url: args.api_base_url.trim_end_matches('/').to_string(),
            max_concurrent: args.max_concurrent.max(1),
            request_timeout: Duration::from_secs(args.request_timeout.max(1)),
            slow_request_threshold: Duration::from_millis(args.slow_request_ms),
            auth_file: args.auth_file,
            login_path: args.login_path,
            settings_path: args.settings_path,
            watcher: WatcherConfig {
                visible_interval: Duration::from_secs(args.poll_visible.max(1)),
                hidden_interval: Duration::from_secs(args.poll_hidden.max(1)),
                hidden_refetch_threshold: Duration::from_secs(args.hidden_refetch),
                ..WatcherConfig::default()
            },
            refresh_window: Duration::from_millis(args.refresh_window_ms),
            log_level: args.log_level,
            json_logs: args.json_logs,
        }
    }
}
