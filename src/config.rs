use std::path::PathBuf;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const DEFAULT_DATABASE_PATH: &str = "medicines.db";

/// Server configuration loaded from environment variables.
///
/// | Env Var         | Default          |
/// |-----------------|------------------|
/// | `BIND_ADDRESS`  | `127.0.0.1:8000` |
/// | `DATABASE_PATH` | `medicines.db`   |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub database_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.into());
        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));

        Self {
            bind_address,
            database_path,
        }
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }
}
