//! Configuration management for Tessera.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.tessera/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all persisted state stored in
//! `.tessera/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

/// Workspace-relative directory for configuration, indexes and prompt overrides.
pub const STATE_DIR: &str = ".tessera";

/// Embedding providers the gateway factory knows how to build.
pub const EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "trigram"];

/// Generation providers the gateway factory knows how to build.
pub const GENERATION_PROVIDERS: [&str; 1] = ["ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .tessera/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Directory of plain-text documents to ingest
    pub corpus_dir: PathBuf,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Chunking, retrieval and context settings
    pub rag: RagSettings,

    /// Embedding service settings
    pub embedding: EmbeddingSettings,

    /// Generation service settings
    pub generation: GenerationSettings,
}

/// What the generator is told when retrieval finds nothing relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoContextPolicy {
    /// Instruct the model to state that no relevant source was found.
    #[default]
    Refuse,

    /// Let the model answer from general knowledge, flagged as unsourced.
    GeneralKnowledge,
}

impl NoContextPolicy {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refuse => "refuse",
            Self::GeneralKnowledge => "general-knowledge",
        }
    }
}

/// Chunking, retrieval and context assembly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RagSettings {
    /// Name of the persisted index collection
    pub collection: String,

    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,

    /// Number of chunks to retrieve
    pub top_k: usize,

    /// Minimum cosine similarity for a chunk to be used
    pub min_score: f32,

    /// Character budget for the source blocks in a prompt
    pub max_context_chars: usize,

    /// Behavior when nothing relevant is retrieved
    pub no_context_policy: NoContextPolicy,

    /// Previous conversation turns rendered into the prompt
    pub history_turns: usize,

    /// Screening of greetings and off-topic questions
    pub domain_guard: DomainGuardSettings,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            collection: "tunisian_archaeology".to_string(),
            chunk_size: 600,
            chunk_overlap: 150,
            top_k: 5,
            min_score: 0.35,
            max_context_chars: 4_000,
            no_context_policy: NoContextPolicy::Refuse,
            history_turns: 3,
            domain_guard: DomainGuardSettings::default(),
        }
    }
}

/// Questions answered with a fixed reply instead of going through retrieval.
///
/// Matching is case-insensitive. A question is a greeting when it equals a
/// greeting word or starts with one followed by a space or comma. It is in
/// the domain when it contains a keyword or matches a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomainGuardSettings {
    pub enabled: bool,

    pub greetings: Vec<String>,

    /// Substrings marking an in-domain question
    pub keywords: Vec<String>,

    /// Regular expressions marking an in-domain question
    pub patterns: Vec<String>,

    pub greeting_reply: String,

    pub off_topic_reply: String,
}

impl Default for DomainGuardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            greetings: words(&[
                "hi", "hello", "salut", "bonjour", "bonsoir", "hey", "coucou", "yo",
                "good morning", "good evening",
            ]),
            keywords: words(&[
                // French
                "tunisie", "tunisien", "site archéologique", "sites archéologiques",
                "archéologie", "patrimoine", "ruines", "antique", "romain", "punique",
                "numide", "byzantin", "amphithéâtre", "théâtre", "forum", "thermes",
                "temple", "mosaïque", "basilique", "capitole",
                // English
                "tunisia", "archaeolog", "heritage", "ruins", "ancient", "roman", "punic",
                "phoenician", "numidian", "byzantine", "amphitheat", "theatre", "theater",
                "baths", "mosaic", "basilica", "capitol",
                // Sites
                "carthage", "dougga", "el jem", "el djem", "sbeitla", "sbeïtla",
                "kerkouane", "bulla regia", "uthina", "maktar", "thuburbo", "chemtou",
                "oudhna",
            ]),
            patterns: words(&[r"\bkerk\w*"]),
            greeting_reply: "Hello! I answer questions about the archaeological sites of \
                             Tunisia: Carthage, Dougga, El Jem, Sbeitla, Kerkouane, Bulla \
                             Regia and others, their history, architecture and periods. \
                             Ask me a question!"
                .to_string(),
            off_topic_reply: "Sorry, I can only answer questions about the archaeological \
                              sites of Tunisia. For example: What is special about the \
                              Roman theatre of Dougga? Tell me about the amphitheatre of \
                              El Jem."
                .to_string(),
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Embedding service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name ("ollama", "trigram")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Provider endpoint
    pub endpoint: String,

    /// Output dimensionality; fixed for the lifetime of a collection
    pub dimensions: usize,

    /// Texts per embedding request batch
    pub batch_size: usize,

    /// Ceiling for a single embedding call
    pub timeout_secs: u64,

    /// Backoff policy for unavailable backends
    pub retry: RetryPolicy,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "all-minilm".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            dimensions: 384,
            batch_size: 16,
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Generation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Provider name ("ollama")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Provider endpoint
    pub endpoint: String,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Nucleus sampling
    pub top_p: Option<f32>,

    /// Ceiling for a whole generation call, or for each streamed fragment
    pub timeout_secs: u64,

    /// Backoff policy for unavailable backends
    pub retry: RetryPolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            temperature: 0.3,
            max_tokens: 512,
            top_p: Some(0.9),
            timeout_secs: 120,
            retry: RetryPolicy::default(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    rag: Option<RagSettings>,
    embedding: Option<EmbeddingSettings>,
    generation: Option<GenerationSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    corpus: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::for_workspace(workspace)
    }
}

impl AppConfig {
    /// Default configuration rooted at `workspace`.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let corpus_dir = workspace.join("data").join("corpus_txt");
        Self {
            workspace,
            config_file: None,
            corpus_dir,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            rag: RagSettings::default(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
        }
    }

    /// Load configuration from defaults, the YAML config file and environment.
    ///
    /// Environment variables:
    /// - `TESSERA_WORKSPACE`: Override workspace path
    /// - `TESSERA_CONFIG`: Path to config file
    /// - `TESSERA_CORPUS`: Corpus directory
    /// - `TESSERA_LLM_MODEL`: Generation model identifier
    /// - `TESSERA_EMBEDDING_MODEL`: Embedding model identifier
    /// - `OLLAMA_URL`: Endpoint for both Ollama services
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use tessera_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`load`](Self::load), with an explicit workspace and config file
    /// taking precedence over `TESSERA_WORKSPACE` and `TESSERA_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let workspace = workspace
            .or_else(|| std::env::var("TESSERA_WORKSPACE").ok().map(PathBuf::from));
        let workspace = match workspace {
            Some(workspace) => workspace,
            None => std::env::current_dir()?,
        };
        let config_file =
            config_file.or_else(|| std::env::var("TESSERA_CONFIG").ok().map(PathBuf::from));

        let mut config = Self::load_from(&workspace, config_file)?;
        config.apply_env();
        Ok(config)
    }

    /// Load defaults merged with the YAML config file for `workspace`.
    ///
    /// Does not read the environment, which keeps it deterministic for tests.
    pub fn load_from(workspace: &Path, config_file: Option<PathBuf>) -> AppResult<Self> {
        if !workspace.exists() {
            return Err(AppError::InvalidConfiguration(format!(
                "Workspace directory does not exist: {:?}",
                workspace
            )));
        }

        let mut config = Self::for_workspace(workspace);
        config.config_file = config_file;

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::InvalidConfiguration(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) {
        if let Ok(corpus) = std::env::var("TESSERA_CORPUS") {
            self.corpus_dir = self.resolve_path(&corpus);
        }

        if let Ok(model) = std::env::var("TESSERA_LLM_MODEL") {
            self.generation.model = model;
        }

        if let Ok(model) = std::env::var("TESSERA_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.embedding.endpoint = url.clone();
            self.generation.endpoint = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        if let Some(corpus) = config_file.workspace.and_then(|ws| ws.corpus) {
            self.corpus_dir = self.resolve_path(&corpus);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        if let Some(rag) = config_file.rag {
            self.rag = rag;
        }
        if let Some(embedding) = config_file.embedding {
            self.embedding = embedding;
        }
        if let Some(generation) = config_file.generation {
            self.generation = generation;
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        corpus: Option<PathBuf>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(corpus) = corpus {
            self.corpus_dir = corpus;
        }

        if let Some(model) = model {
            self.generation.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .tessera directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .tessera directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::InvalidConfiguration(format!(
                    "Failed to create .tessera directory: {}",
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Resolve a possibly relative path against the workspace.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate every setting; any failure is fatal at startup.
    pub fn validate(&self) -> AppResult<()> {
        let rag = &self.rag;

        if rag.collection.trim().is_empty() {
            return Err(invalid("rag.collection must not be empty"));
        }
        if rag.chunk_size == 0 {
            return Err(invalid("rag.chunkSize must be greater than 0"));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "rag.chunkOverlap ({}) must be smaller than rag.chunkSize ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.top_k == 0 {
            return Err(invalid("rag.topK must be greater than 0"));
        }
        if !(-1.0..=1.0).contains(&rag.min_score) {
            return Err(AppError::InvalidConfiguration(format!(
                "rag.minScore ({}) must be within [-1, 1]",
                rag.min_score
            )));
        }
        if rag.max_context_chars == 0 {
            return Err(invalid("rag.maxContextChars must be greater than 0"));
        }
        let guard = &rag.domain_guard;
        if guard.enabled && guard.keywords.is_empty() && guard.patterns.is_empty() {
            return Err(invalid("rag.domainGuard needs keywords or patterns when enabled"));
        }

        let embedding = &self.embedding;
        if !EMBEDDING_PROVIDERS.contains(&embedding.provider.as_str()) {
            return Err(AppError::InvalidConfiguration(format!(
                "Unknown embedding provider: {}. Supported: {}",
                embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions must be greater than 0"));
        }
        if embedding.batch_size == 0 {
            return Err(invalid("embedding.batchSize must be greater than 0"));
        }
        if embedding.timeout_secs == 0 {
            return Err(invalid("embedding.timeoutSecs must be greater than 0"));
        }
        if embedding.retry.max_attempts == 0 {
            return Err(invalid("embedding.retry.maxAttempts must be at least 1"));
        }

        let generation = &self.generation;
        if !GENERATION_PROVIDERS.contains(&generation.provider.as_str()) {
            return Err(AppError::InvalidConfiguration(format!(
                "Unknown generation provider: {}. Supported: {}",
                generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }
        if generation.model.trim().is_empty() {
            return Err(invalid("generation.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(AppError::InvalidConfiguration(format!(
                "generation.temperature ({}) must be within [0, 2]",
                generation.temperature
            )));
        }
        if generation.timeout_secs == 0 {
            return Err(invalid("generation.timeoutSecs must be greater than 0"));
        }
        if generation.retry.max_attempts == 0 {
            return Err(invalid("generation.retry.maxAttempts must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::InvalidConfiguration(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::for_workspace("/tmp/ws");
        assert_eq!(config.rag.chunk_size, 600);
        assert_eq!(config.rag.chunk_overlap, 150);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.generation.model, "llama3");
        assert_eq!(config.rag.no_context_policy, NoContextPolicy::Refuse);
        assert!(config.corpus_dir.ends_with("data/corpus_txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_state_dir() {
        let config = AppConfig::for_workspace("/tmp/ws");
        assert!(config.state_dir().ends_with(".tessera"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::for_workspace("/tmp/ws");
        let overridden = config.with_overrides(
            None,
            None,
            Some(PathBuf::from("/data/docs")),
            Some("mistral".to_string()),
            None,
            true,
            false,
            true,
        );

        assert_eq!(overridden.corpus_dir, PathBuf::from("/data/docs"));
        assert_eq!(overridden.generation.model, "mistral");
        assert!(overridden.verbose);
        assert!(overridden.log_json);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = AppConfig::for_workspace("/tmp/ws");
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::for_workspace("/tmp/ws");
        config.rag.min_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::for_workspace("/tmp/ws");
        config.embedding.provider = "unknown".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::for_workspace("/tmp/ws");
        config.rag.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::for_workspace("/tmp/ws");
        config.rag.domain_guard.keywords.clear();
        config.rag.domain_guard.patterns.clear();
        assert!(config.validate().is_err());
        config.rag.domain_guard.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_domain_guard_yaml_overrides_lists() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".tessera")).unwrap();
        std::fs::write(
            temp.path().join(".tessera/config.yaml"),
            r#"
rag:
  domainGuard:
    keywords: [pyramid, giza]
    offTopicReply: Egypt only.
"#,
        )
        .unwrap();

        let guard = AppConfig::load_from(temp.path(), None).unwrap().rag.domain_guard;
        assert!(guard.enabled);
        assert_eq!(guard.keywords, vec!["pyramid", "giza"]);
        assert_eq!(guard.off_topic_reply, "Egypt only.");
        assert_eq!(guard.patterns, vec![r"\bkerk\w*"]);
        assert!(guard.greetings.contains(&"bonjour".to_string()));
    }

    #[test]
    fn test_load_from_merges_partial_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".tessera")).unwrap();
        std::fs::write(
            temp.path().join(".tessera/config.yaml"),
            r#"
workspace:
  corpus: docs
logging:
  level: warn
rag:
  chunkSize: 800
  chunkOverlap: 100
  noContextPolicy: general-knowledge
embedding:
  provider: trigram
  dimensions: 64
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(temp.path(), None).unwrap();
        assert_eq!(config.corpus_dir, temp.path().join("docs"));
        assert_eq!(config.log_level, Some("warn".to_string()));
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(
            config.rag.no_context_policy,
            NoContextPolicy::GeneralKnowledge
        );
        assert_eq!(config.embedding.provider, "trigram");
        assert_eq!(config.embedding.dimensions, 64);
        assert_eq!(config.embedding.batch_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = AppConfig::load_from(temp.path(), Some(temp.path().join("nope.yaml")));
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }
}
