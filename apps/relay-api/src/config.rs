use std::time::Duration;

/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC-SHA256 secret for signing access and refresh tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Idle-read deadline of a socket; pings go out at 9/10 of it.
    pub pong_wait: Duration,
    /// Largest inbound WebSocket frame accepted.
    pub max_frame_bytes: usize,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT", 8080),
            access_token_ttl: Duration::from_secs(parsed_var("ACCESS_TOKEN_TTL_SECS", 900)),
            refresh_token_ttl: Duration::from_secs(parsed_var("REFRESH_TOKEN_TTL_SECS", 604_800)),
            pong_wait: Duration::from_secs(parsed_var("PONG_WAIT_SECS", 10)),
            max_frame_bytes: parsed_var("MAX_FRAME_BYTES", 512),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
        }
    }

    /// Defaults with the given secret. Used by tests and tools.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            port: 8080,
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(604_800),
            pong_wait: Duration::from_secs(10),
            max_frame_bytes: 512,
            allowed_origins: Vec::new(),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
