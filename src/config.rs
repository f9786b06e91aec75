use crate::error::AppError;

pub const DEFAULT_PROFILE_PIC: &str = "https://s3.amazonaws.com/pc-profile-pics/default_profile.png";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub sweep_interval_secs: u64,
    pub max_ws_connections: usize,
    pub session_queue_capacity: usize,
    pub default_quota: i64,
    pub default_profile_pic: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://convo_server.db?mode=rwc".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DB_MAX_CONNECTIONS: {}", e)))?,
            db_min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DB_MIN_CONNECTIONS: {}", e)))?,
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid SWEEP_INTERVAL_SECS: {}", e)))?,
            max_ws_connections: std::env::var("MAX_WS_CONNECTIONS")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid MAX_WS_CONNECTIONS: {}", e)))?,
            session_queue_capacity: std::env::var("SESSION_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid SESSION_QUEUE_CAPACITY: {}", e)))?,
            default_quota: std::env::var("DEFAULT_QUOTA")
                .unwrap_or_else(|_| "2000000".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DEFAULT_QUOTA: {}", e)))?,
            default_profile_pic: std::env::var("DEFAULT_PROFILE_PIC")
                .unwrap_or_else(|_| DEFAULT_PROFILE_PIC.to_string()),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
