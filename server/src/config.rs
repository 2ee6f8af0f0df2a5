use std::time::Duration;

pub const SSE_KEEPALIVE_SECS: u64 = 15;
pub const DEFAULT_BROADCAST_BUFFER: usize = 256;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STATIC_DIR: &str = "client/dist";
pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const MAX_BOXES_PER_TERRITORY: usize = 20_000;

pub fn database_url() -> Option<String> {
    non_empty_env("DATABASE_URL")
}

pub fn db_max_connections() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

pub fn sse_broadcast_buffer() -> usize {
    std::env::var("SSE_BROADCAST_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_BROADCAST_BUFFER)
}

/// Change notifications target. Unset disables the webhook.
pub fn webhook_url() -> Option<String> {
    non_empty_env("WEBHOOK_URL").filter(|url| url.starts_with("http://") || url.starts_with("https://"))
}

pub fn webhook_timeout() -> Duration {
    std::env::var("WEBHOOK_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS))
}

pub fn static_dir() -> String {
    non_empty_env("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
}

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
