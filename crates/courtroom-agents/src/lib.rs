//! Live agents and runtime wiring for the courtroom turn orchestrator.
//!
//! - [`config`]: layered configuration (defaults, TOML/YAML file, environment)
//! - [`openai`]: OpenAI Responses API capability
//! - [`court`]: builds the orchestrator from configuration
//! - [`telemetry`]: per-sequence metrics with JSONL output

pub mod config;
pub mod court;
pub mod openai;
pub mod telemetry;

pub use config::{ConfigError, CourtConfig, ProviderConfig};
pub use court::{build_capability, build_orchestrator, build_orchestrator_with};
pub use openai::OpenAiResponses;
