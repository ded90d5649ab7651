//! Server location and base URL construction.

use crate::error::StoreError;

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5984;

/// Where the database lives.
///
/// Renders to `<scheme>://<host>:<port>/<database>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl ServerConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: database.into(),
        }
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Read `COUCH_DATABASE` (required) plus optional `COUCH_SCHEME`,
    /// `COUCH_HOST` and `COUCH_PORT`.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let database = lookup("COUCH_DATABASE")
            .filter(|db| !db.is_empty())
            .ok_or_else(|| StoreError::Config("COUCH_DATABASE is not set".to_string()))?;
        let mut config = Self::new(database);
        if let Some(scheme) = lookup("COUCH_SCHEME") {
            config.scheme = scheme;
        }
        if let Some(host) = lookup("COUCH_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("COUCH_PORT") {
            config.port = port
                .parse()
                .map_err(|_| StoreError::Config(format!("invalid COUCH_PORT: {port}")))?;
        }
        Ok(config)
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/{}/",
            self.scheme,
            self.host,
            self.port,
            urlencoding::encode(&self.database)
        )
    }
}
