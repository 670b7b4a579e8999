use crate::services::analyzer::GEMINI_ENDPOINT;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_BUCKET_URL: &str = "gs://cloud-native-dev-p1";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 30;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket_url: String,
    pub cache_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub cache_max_bytes: Option<u64>,
    pub max_upload_bytes: usize,
    /// Present only when image analysis is enabled.
    pub analyzer: Option<AnalyzerConfig>,
}

#[derive(Clone)]
pub struct AnalyzerConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image upload service backed by a cloud bucket")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket URL, e.g. gs://bucket or s3://bucket/prefix (overrides IMAGE_STORE_BUCKET_URL)
    #[arg(long)]
    pub bucket_url: Option<String>,

    /// Directory for cached downloads (overrides IMAGE_STORE_CACHE_DIR)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for staged uploads (overrides IMAGE_STORE_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Cap on total cached bytes; unbounded when unset (overrides IMAGE_STORE_CACHE_MAX_BYTES)
    #[arg(long)]
    pub cache_max_bytes: Option<u64>,

    /// Largest accepted upload body (overrides IMAGE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Generate a title/description sidecar for every upload. Requires GEMINI_API_KEY.
    #[arg(long)]
    pub analyze: bool,

    /// Gemini model name (overrides IMAGE_STORE_GEMINI_MODEL)
    #[arg(long)]
    pub gemini_model: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed arguments over values looked up with `env`. CLI wins.
    ///
    /// Fails when analysis is enabled without an API key.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = parse_var(&env, "IMAGE_STORE_PORT")?.unwrap_or(3000);
        let env_cache_max = parse_var(&env, "IMAGE_STORE_CACHE_MAX_BYTES")?;
        let env_max_upload =
            parse_var(&env, "IMAGE_STORE_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let env_analyze = parse_var::<bool>(&env, "IMAGE_STORE_ANALYZE")?.unwrap_or(false);

        let analyzer = if args.analyze || env_analyze {
            let api_key = env("GEMINI_API_KEY")
                .filter(|key| !key.trim().is_empty())
                .context("GEMINI_API_KEY must be set when image analysis is enabled")?;
            let timeout_secs = parse_var(&env, "IMAGE_STORE_ANALYZER_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_ANALYZER_TIMEOUT_SECS);
            Some(AnalyzerConfig {
                api_key,
                model: args
                    .gemini_model
                    .or_else(|| env("IMAGE_STORE_GEMINI_MODEL"))
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
                endpoint: env("IMAGE_STORE_GEMINI_ENDPOINT")
                    .unwrap_or_else(|| GEMINI_ENDPOINT.into()),
                timeout: Duration::from_secs(timeout_secs),
            })
        } else {
            None
        };

        let cfg = Self {
            host: args
                .host
                .or_else(|| env("IMAGE_STORE_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            bucket_url: args
                .bucket_url
                .or_else(|| env("IMAGE_STORE_BUCKET_URL"))
                .unwrap_or_else(|| DEFAULT_BUCKET_URL.into()),
            cache_dir: args
                .cache_dir
                .or_else(|| env("IMAGE_STORE_CACHE_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./files")),
            upload_dir: args
                .upload_dir
                .or_else(|| env("IMAGE_STORE_UPLOAD_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            cache_max_bytes: args.cache_max_bytes.or(env_cache_max),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            analyzer,
        };

        if cfg.cache_dir == cfg.upload_dir {
            bail!("cache and upload directories must differ");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}
