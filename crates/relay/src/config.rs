// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The CORS layer reads its origin list through here as well.

use std::net::SocketAddr;

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub(crate) struct RelayConfig {
    /// Listen address (host:port).
    pub(crate) listen_addr: SocketAddr,
    /// PostgreSQL connection string; the in-memory store is used when
    /// unset.
    pub(crate) database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub(crate) cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `pairlab_relay=debug`).
    pub(crate) log_filter: String,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PAIRLAB_RELAY_HOST` | `0.0.0.0` |
    /// | `PAIRLAB_RELAY_PORT` | `8080` |
    /// | `PAIRLAB_RELAY_DATABASE_URL` | *(none — in-memory store)* |
    /// | `PAIRLAB_RELAY_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `PAIRLAB_RELAY_LOG_FILTER` | `info` |
    pub(crate) fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("PAIRLAB_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("PAIRLAB_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let database_url = env("PAIRLAB_RELAY_DATABASE_URL").ok();
        let cors_origins = env("PAIRLAB_RELAY_CORS_ORIGINS").ok();

        let log_filter = env("PAIRLAB_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, database_url, cors_origins, log_filter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = RelayConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert!(cfg.database_url.is_none());
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("PAIRLAB_RELAY_HOST", "127.0.0.1");
        m.insert("PAIRLAB_RELAY_PORT", "3000");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn database_url_from_env() {
        let mut m = HashMap::new();
        m.insert("PAIRLAB_RELAY_DATABASE_URL", "postgres://u:p@host/db");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@host/db"));
    }

    #[test]
    fn cors_origins_from_env() {
        let mut m = HashMap::new();
        m.insert("PAIRLAB_RELAY_CORS_ORIGINS", "https://app.pairlab.dev");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.cors_origins.as_deref(), Some("https://app.pairlab.dev"));
    }

    #[test]
    fn log_filter_override() {
        let mut m = HashMap::new();
        m.insert("PAIRLAB_RELAY_LOG_FILTER", "debug,tower_http=trace");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.log_filter, "debug,tower_http=trace");
    }

    #[test]
    fn invalid_port_uses_default() {
        let mut m = HashMap::new();
        m.insert("PAIRLAB_RELAY_PORT", "not_a_number");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8080);
    }
}
