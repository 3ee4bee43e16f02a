use std::{env, path::PathBuf};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "50555";

/// The process-level configuration, read once at startup.
#[derive(Debug)]
pub struct ServerConfig {
    /// The single listening endpoint.
    pub addr: String,
    /// The directory holding the persisted weight artifacts.
    pub weights_dir: PathBuf,
}

impl ServerConfig {
    /// Builds the configuration from `HOST`, `PORT` and `WEIGHTS_DIR`, with
    /// defaults for everything.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let weights_dir = env::var_os("WEIGHTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            addr: format!("{host}:{port}"),
            weights_dir,
        }
    }
}
