use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, Args, Parser, ValueEnum};
use venue_agent::{ApiKey, BrowserOptions, DriverConfig};

/// Command line and environment configuration.
///
/// Every option can also be set through the environment variable named in
/// its help text; a `.env` file is loaded before parsing.
#[derive(Debug, Parser)]
#[command(name = "venue-agent", version, about = "Extract venue listings from websites with language models")]
pub struct Cli {
    /// Maximum backend calls per task
    #[arg(long, env = "LIMIT", default_value_t = 50, value_parser = value_parser!(u32).range(1..))]
    pub limit: u32,

    /// JSON file with the tasks: `[{"name": ..., "url": ...}]`
    #[arg(long, env = "TASKS_FILE", default_value = "./escapeRooms.json")]
    pub tasks: PathBuf,

    /// Directory for the per-backend result files
    #[arg(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub tokens: ApiTokens,

    #[command(flatten)]
    pub models: ModelLists,

    /// How pages are fetched
    #[arg(long, env = "BROWSER", value_enum, default_value_t = BrowserKind::Http)]
    pub browser: BrowserKind,

    /// Chromium binary (chromium browser only)
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Upper bound for one page load
    #[arg(long, env = "PAGE_TIMEOUT_SECS", default_value_t = 30)]
    pub page_timeout_secs: u64,

    /// Proxy for all page traffic
    #[arg(long, env = "PROXY_SERVER")]
    pub proxy_server: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::default().with_turn_limit(self.limit as usize)
    }

    pub fn browser_options(&self) -> BrowserOptions {
        let options =
            BrowserOptions::default().with_page_timeout(Duration::from_secs(self.page_timeout_secs));
        match &self.proxy_server {
            Some(proxy) => options.with_proxy_server(proxy.clone()),
            None => options,
        }
    }
}

/// API tokens. A vendor's backends are only registered when its token is set.
#[derive(Debug, Default, Args)]
pub struct ApiTokens {
    #[arg(long = "chatgpt-token", env = "CHATGPTTOKEN", hide_env_values = true)]
    pub chatgpt: Option<ApiKey>,

    #[arg(long = "claude-token", env = "CLAUDETOKEN", hide_env_values = true)]
    pub claude: Option<ApiKey>,

    #[arg(long = "mistral-token", env = "MISTRALTOKEN", hide_env_values = true)]
    pub mistral: Option<ApiKey>,

    #[arg(long = "together-token", env = "TOGETHERAITOKEN", hide_env_values = true)]
    pub together: Option<ApiKey>,

    #[arg(long = "jamba-token", env = "JAMBATOKEN", hide_env_values = true)]
    pub jamba: Option<ApiKey>,

    #[command(flatten)]
    pub gcloud: GcloudOptions,
}

/// Vertex AI access for the Gemini backends.
///
/// Gemini models are only registered when both the project and an access
/// token are set.
#[derive(Debug, Default, Args)]
pub struct GcloudOptions {
    #[arg(long = "gcloud-project-id", env = "GCLOUDPROJECTID")]
    pub project_id: Option<String>,

    #[arg(long = "gcloud-location-id", env = "GCLOUDLOCATIONID", default_value = "us-central1")]
    pub location_id: String,

    /// OAuth access token, e.g. from `gcloud auth print-access-token`
    #[arg(long = "gcloud-access-token", env = "GCLOUDACCESSTOKEN", hide_env_values = true)]
    pub access_token: Option<ApiKey>,
}

/// Models to run per vendor, comma separated.
#[derive(Debug, Args)]
pub struct ModelLists {
    #[arg(long, env = "GPT_MODELS", value_delimiter = ',', default_values_t = [String::from("gpt-4o-mini")])]
    pub gpt_models: Vec<String>,

    #[arg(long, env = "CLAUDE_MODELS", value_delimiter = ',', default_values_t = [String::from("claude-3-5-sonnet-20240620")])]
    pub claude_models: Vec<String>,

    #[arg(long, env = "MISTRAL_MODELS", value_delimiter = ',', default_values_t = [String::from("mistral-large-2407")])]
    pub mistral_models: Vec<String>,

    #[arg(long, env = "TOGETHER_MODELS", value_delimiter = ',', default_values_t = [String::from("meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo")])]
    pub together_models: Vec<String>,

    #[arg(
        long,
        env = "JAMBA_MODELS",
        value_delimiter = ',',
        default_values_t = [String::from("jamba-1.5-large"), String::from("jamba-1.5-mini")]
    )]
    pub jamba_models: Vec<String>,

    #[arg(
        long,
        env = "GEMINI_MODELS",
        value_delimiter = ',',
        default_values_t = [String::from("gemini-1.5-flash-001"), String::from("gemini-1.5-pro-001")]
    )]
    pub gemini_models: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowserKind {
    /// Plain HTTP requests, no JavaScript
    Http,
    /// Headless Chromium (needs the `chromium` feature)
    Chromium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
