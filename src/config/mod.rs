use std::env;
use std::path::PathBuf;

pub const DEFAULT_STORE_FILE: &str = "./examsy-store.json";
pub const DEFAULT_CREDENTIAL_FILE: &str = "./examsy-auth.json";

/// Fallback password for imported or added students without one
pub const DEFAULT_STUDENT_PASSWORD: &str = "password123";

pub const DEFAULT_STUDENT_CLASS: &str = "7";

pub struct Config {
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub import: ImportConfig,
    pub log: LogConfig,
}

pub struct StorageConfig {
    pub store_file: PathBuf,
    pub credential_file: PathBuf,
}

pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub default_password: String,
    pub default_class: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct LogConfig {
    pub format: LogFormat,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_password: DEFAULT_STUDENT_PASSWORD.to_string(),
            default_class: DEFAULT_STUDENT_CLASS.to_string(),
        }
    }
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            storage: StorageConfig {
                store_file: env::var("EXAMSY_STORE_FILE")
                    .unwrap_or_else(|_| DEFAULT_STORE_FILE.to_string())
                    .into(),
                credential_file: env::var("EXAMSY_CREDENTIAL_FILE")
                    .unwrap_or_else(|_| DEFAULT_CREDENTIAL_FILE.to_string())
                    .into(),
            },
            admin: AdminConfig {
                username: env::var("EXAMSY_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                password: env::var("EXAMSY_ADMIN_PASSWORD")
                    .unwrap_or_else(|_| "admin123".to_string()),
            },
            import: ImportConfig {
                default_password: env::var("EXAMSY_DEFAULT_PASSWORD")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_STUDENT_PASSWORD.to_string()),
                default_class: env::var("EXAMSY_DEFAULT_CLASS")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_STUDENT_CLASS.to_string()),
            },
            log: LogConfig {
                format: env::var("LOG_FORMAT")
                    .map(|v| LogFormat::parse(&v))
                    .unwrap_or(LogFormat::Pretty),
            },
        }
    }

    /// Installs the global tracing subscriber. `RUST_LOG` overrides the default filter.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match self.log.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.try_init(),
        };

        if let Err(e) = result {
            eprintln!("tracing subscriber already installed: {}", e);
        }
    }

    pub fn admin_matches(&self, username: &str, password: &str) -> bool {
        self.admin.username == username.trim() && self.admin.password == password
    }
}
