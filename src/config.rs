use crate::client::ReplyOrdering;
use crate::llm::{LlmSettings, Provider};
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the chat server (default)
    Serve,
    /// Chat with a running server from the terminal
    Chat {
        /// Server base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Render replies in submission order
        #[arg(long)]
        ordered: bool,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub resilience: ResilienceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub ordering: ReplyOrdering,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per query.
    pub top_k: usize,
    /// Vector length of the local embedder.
    pub vector_dim: usize,
    /// Embedding model served by the LLM endpoint. Unset means the local
    /// hashing embedder.
    pub embedding_model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Layer defaults, config file, environment and CLI flags.
    ///
    /// Priority: CLI flag > CLI env var > `LLM_*` vars > `DOCCHAT_*` vars >
    /// config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.port", 5000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.static_dir", "static")?
            .set_default("client.base_url", "http://127.0.0.1:5000")?
            .set_default("client.ordering", "arrival")?
            .set_default("rag.chunk_size", 500)?
            .set_default("rag.chunk_overlap", 50)?
            .set_default("rag.top_k", 5)?
            .set_default("rag.vector_dim", 384)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("log.json", false)?;

        // Explicit file must exist; the cwd fallback is optional.
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
        }

        // E.g. DOCCHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("DOCCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in [
            ("LLM_BASE_URL", "llm.base_url"),
            ("LLM_MODEL", "llm.model"),
            ("LLM_API_KEY", "llm.api_key"),
            ("LLM_SYSTEM_PROMPT", "llm.system_prompt"),
            ("AZURE_DEPLOYMENT_NAME", "llm.azure_deployment"),
            ("AZURE_API_VERSION", "llm.azure_api_version"),
            ("EMBEDDING_MODEL", "rag.embedding_model"),
        ] {
            if let Ok(val) = env::var(var) {
                if !val.trim().is_empty() {
                    builder = builder.set_override(key, val)?;
                }
            }
        }

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("log.json", json)?;
        }
        if let Some(Command::Chat { base_url, ordered }) = &cli.command {
            if let Some(url) = base_url {
                builder = builder.set_override("client.base_url", url.as_str())?;
            }
            if *ordered {
                builder = builder.set_override("client.ordering", "submission")?;
            }
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    /// Model settings, or `None` when no model is configured.
    pub fn llm_settings(&self) -> Option<LlmSettings> {
        let base_url = non_empty(self.llm.base_url.as_deref())?;
        let model = non_empty(self.llm.model.as_deref())?;

        let mut settings = LlmSettings::new(base_url, model);
        settings.api_key = non_empty(self.llm.api_key.as_deref()).map(ToString::to_string);
        settings.system_prompt =
            non_empty(self.llm.system_prompt.as_deref()).map(ToString::to_string);

        if let Provider::AzureOpenAI { api_version, .. } = &settings.provider {
            if let Some(deployment) = non_empty(self.llm.azure_deployment.as_deref()) {
                settings.provider = Provider::AzureOpenAI {
                    deployment_name: deployment.to_string(),
                    api_version: self
                        .llm
                        .azure_api_version
                        .clone()
                        .unwrap_or_else(|| api_version.clone()),
                };
            }
        }

        Some(settings)
    }

    /// Settings for a remote embedding model, or `None` when either the
    /// model endpoint or `rag.embedding_model` is unset.
    pub fn embedding_settings(&self) -> Option<LlmSettings> {
        let base_url = non_empty(self.llm.base_url.as_deref())?;
        let model = non_empty(self.rag.embedding_model.as_deref())?;

        let mut settings = LlmSettings::new(base_url, model);
        settings.api_key = non_empty(self.llm.api_key.as_deref()).map(ToString::to_string);

        // Azure addresses models by deployment.
        if let Provider::AzureOpenAI { api_version, .. } = &settings.provider {
            settings.provider = Provider::AzureOpenAI {
                deployment_name: model.to_string(),
                api_version: self
                    .llm
                    .azure_api_version
                    .clone()
                    .unwrap_or_else(|| api_version.clone()),
            };
        }

        Some(settings)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
