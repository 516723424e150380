//! Configuration for the Postgres adapter

#[derive(Debug, Clone)]
pub struct PgConfig {
    pub dsn: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
}

impl PgConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_connections: 10,
            connect_timeout_ms: 5000,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }
}

impl From<&kg_core::config::PostgresConfig> for PgConfig {
    fn from(cfg: &kg_core::config::PostgresConfig) -> Self {
        Self::new(cfg.dsn.clone()).with_max_connections(cfg.max_connections)
    }
}
