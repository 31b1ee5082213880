use serde::Deserialize;
use std::env;

use crate::services::progression::ProgressPolicy;
use crate::services::quiz_engine::AskPolicy;
use crate::services::quiz_machine::RepeatMode;
use crate::services::scoring::ScoringRules;

pub const DEFAULT_TOPICS: [&str; 10] = [
    "Project Integration Management",
    "Project Scope Management",
    "Project Schedule Management",
    "Project Cost Management",
    "Project Quality Management",
    "Project Resource Management",
    "Project Communications Management",
    "Project Risk Management",
    "Project Procurement Management",
    "Project Stakeholder Management",
];

/// Tunables of the quiz engine. Every field has a default so a partial
/// `[engine]` section is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub topics: Vec<String>,
    pub batch_size: usize,
    pub scoring: ScoringRules,
    pub countdown_seconds: u32,
    pub feedback_interval_ms: u64,
    pub progress_policy: ProgressPolicy,
    pub repeat_mode: RepeatMode,
    pub ask_policy: AskPolicy,
    pub fallback_enabled: bool,
    pub generation_attempts: usize,
    pub generation_backoff_ms: u64,
    pub start_cost: i64,
    pub ask_cost: i64,
    pub assistant_context_messages: usize,
    pub event_buffer: usize,
    pub session_idle_timeout_secs: u64,
    pub session_sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            batch_size: 10,
            scoring: ScoringRules::default(),
            countdown_seconds: 3,
            feedback_interval_ms: 1000,
            progress_policy: ProgressPolicy::default(),
            repeat_mode: RepeatMode::default(),
            ask_policy: AskPolicy::default(),
            fallback_enabled: false,
            generation_attempts: 2,
            generation_backoff_ms: 250,
            start_cost: 100,
            ask_cost: 0,
            assistant_context_messages: 10,
            event_buffer: 128,
            session_idle_timeout_secs: 1800,
            session_sweep_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err("engine.topics must contain at least one topic".to_string());
        }
        if self.batch_size == 0 {
            return Err("engine.batch_size must be positive".to_string());
        }
        if self.generation_attempts == 0 {
            return Err("engine.generation_attempts must be positive".to_string());
        }
        if self.session_sweep_interval_secs == 0 {
            return Err("engine.session_sweep_interval_secs must be positive".to_string());
        }
        if self.start_cost < 0 || self.ask_cost < 0 {
            return Err("engine costs must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub engine: EngineConfig,
    pub openai: OpenAiConfig,
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub initial_credits: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // APP__ENGINE__TOPICS="A,B,C" overrides the rotation
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.topics")
                    .try_parsing(true),
            )
            .build()?;

        let engine = match settings.get::<EngineConfig>("engine") {
            Ok(engine) => engine,
            Err(config::ConfigError::NotFound(_)) => EngineConfig::default(),
            Err(e) => return Err(e),
        };
        engine.validate().map_err(config::ConfigError::Message)?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let api_key = settings
            .get_string("openai.api_key")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: OPENAI_API_KEY must be set in production!");
                }
                eprintln!("WARNING: OPENAI_API_KEY is not set, question generation will fail");
                String::new()
            });

        let openai = OpenAiConfig {
            base_url: settings
                .get_string("openai.base_url")
                .or_else(|_| env::var("OPENAI_BASE_URL"))
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            model: settings
                .get_string("openai.model")
                .or_else(|_| env::var("OPENAI_MODEL"))
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_seconds: settings
                .get_int("openai.timeout_seconds")
                .ok()
                .filter(|v| *v > 0)
                .map(|v| v as u64)
                .unwrap_or(30),
        };

        // Storage collaborators are optional; without them snapshots are only
        // logged and credits are unlimited.
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .ok()
            .filter(|v| !v.is_empty());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "quizmaster".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|v| !v.is_empty());

        let initial_credits = settings
            .get_int("redis.initial_credits")
            .ok()
            .or_else(|| {
                env::var("INITIAL_CREDITS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .unwrap_or(1000);

        Ok(Config {
            bind_addr,
            engine,
            openai,
            mongo_uri,
            mongo_database,
            redis_uri,
            initial_credits,
        })
    }
}
