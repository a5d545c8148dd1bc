use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL of the text-generation engine (e.g., "http://127.0.0.1:8188").
    pub model_server_url: String,
    /// Base URL of the model hub used by download jobs.
    pub hub_base_url: String,
    /// HMAC secret for session tokens. Required; there is no default.
    pub session_secret: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("fortress.db")
    }

    /// Directory where download jobs place fetched model files.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}
