use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_window_secs: u64,
    pub tool_path: PathBuf,
    pub tool_args: Vec<String>,
    pub tool_dir: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    /// 0 表示不限制外部程序的运行时间
    pub process_timeout_secs: u64,
    pub web_root: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "::".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
            rate_limit_window_secs: 2,
            tool_path: PathBuf::from("slice_localize"),
            tool_args: Vec::new(),
            tool_dir: None,
            scratch_dir: env::temp_dir().join("slice_recognition"),
            process_timeout_secs: 300,
            web_root: PathBuf::from("wwwroot"),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            rate_limit_window_secs: parse_var("RATE_LIMIT_WINDOW_SECS")?
                .unwrap_or(defaults.rate_limit_window_secs),
            tool_path: env::var_os("TOOL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tool_path),
            tool_args: env::var("TOOL_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            tool_dir: env::var_os("TOOL_DIR").map(PathBuf::from),
            scratch_dir: env::var_os("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            process_timeout_secs: parse_var("PROCESS_TIMEOUT_SECS")?
                .unwrap_or(defaults.process_timeout_secs),
            web_root: env::var_os("WEB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.web_root),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        (self.process_timeout_secs > 0).then(|| Duration::from_secs(self.process_timeout_secs))
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.web_root.join("sampleimgs")
    }
}

// 未设置时返回 None，设置了但无法解析时报错
fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
