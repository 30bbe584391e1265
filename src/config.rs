//! Server configuration from command-line flags and `TESTGEN_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::engine::GenerationParams;
use crate::models::{ModelConfig, DEFAULT_ENGINE_URL, DEFAULT_MODEL_ID};
use crate::stage::PromptSet;

/// Options for `testgen serve`.
#[derive(Parser, Debug, Clone)]
#[command(name = "testgen")]
pub struct ServeArgs {
    /// Address to bind the HTTP API on
    #[arg(long, env = "TESTGEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(short, long, env = "TESTGEN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Default OpenAI-compatible engine URL for /api/init
    #[arg(long, env = "TESTGEN_ENGINE_URL", default_value = DEFAULT_ENGINE_URL)]
    pub engine_url: String,

    /// Default served model name for /api/init
    #[arg(long, env = "TESTGEN_MODEL", default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    /// Bearer token sent to the engine
    #[arg(long, env = "TESTGEN_ENGINE_API_KEY", hide_env_values = true)]
    pub engine_api_key: Option<String>,

    /// Per-request engine timeout in seconds
    #[arg(long, env = "TESTGEN_REQUEST_TIMEOUT", default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// Engine connect timeout in seconds
    #[arg(long, env = "TESTGEN_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Sampling temperature for every stage
    #[arg(long, env = "TESTGEN_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Completion token limit for every stage
    #[arg(long, env = "TESTGEN_MAX_TOKENS", default_value_t = 4096)]
    pub max_tokens: u32,

    /// Extra attempts after a transient engine error
    #[arg(long, env = "TESTGEN_ENGINE_RETRIES", default_value_t = 1)]
    pub engine_retries: u32,

    /// Directory with prompt template overrides
    #[arg(long, env = "TESTGEN_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,

    /// Initialize the default model session on startup
    #[arg(long, env = "TESTGEN_AUTO_INIT")]
    pub auto_init: bool,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub default_model: ModelConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub params: GenerationParams,
    pub engine_retries: u32,
    pub prompt_dir: Option<PathBuf>,
    pub auto_init: bool,
}

impl ServerConfig {
    pub fn from_args(args: &ServeArgs) -> anyhow::Result<Self> {
        let bind: SocketAddr = format!("{}:{}", args.host, args.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;

        anyhow::ensure!(
            (0.0..=2.0).contains(&args.temperature),
            "temperature must be between 0 and 2, got {}",
            args.temperature
        );
        anyhow::ensure!(args.max_tokens > 0, "max tokens must be positive");
        anyhow::ensure!(
            args.request_timeout_secs > 0 && args.connect_timeout_secs > 0,
            "timeouts must be positive"
        );

        Ok(Self {
            bind,
            default_model: ModelConfig {
                base_url: args.engine_url.clone(),
                model_id: args.model.clone(),
                api_key: args.engine_api_key.clone(),
            },
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            params: GenerationParams {
                temperature: args.temperature,
                max_tokens: args.max_tokens,
            },
            engine_retries: args.engine_retries,
            prompt_dir: args.prompt_dir.clone(),
            auto_init: args.auto_init,
        })
    }

    /// Built-in prompts, with overrides from `prompt_dir` when set.
    pub fn prompts(&self) -> anyhow::Result<PromptSet> {
        match &self.prompt_dir {
            Some(dir) => PromptSet::load_dir(dir),
            None => Ok(PromptSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["testgen"];
        argv.extend_from_slice(args);
        ServeArgs::parse_from(argv)
    }

    #[test]
    fn defaults_match_local_engine() {
        let config = ServerConfig::from_args(&parse(&[])).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.default_model.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.params.max_tokens, 4096);
        assert_eq!(config.engine_retries, 1);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::from_args(&parse(&[
            "--port",
            "9000",
            "--model",
            "Qwen3-32B",
            "--temperature",
            "0.2",
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.default_model.model_id, "Qwen3-32B");
        assert_eq!(config.params.temperature, 0.2);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(ServerConfig::from_args(&parse(&["--temperature", "3.5"])).is_err());
    }

    #[test]
    fn rejects_bad_host() {
        assert!(ServerConfig::from_args(&parse(&["--host", "not a host"])).is_err());
    }
}
