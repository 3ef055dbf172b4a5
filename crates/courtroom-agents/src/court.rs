//! Wiring: configuration → capability → adapter → orchestrator.

use std::sync::Arc;

use anyhow::Result;
use coordination::{
    DisabledCapability, ResilientAdapter, SessionStore, TextGenerationCapability, TurnOrchestrator,
};
use tracing::{info, warn};

use crate::config::CourtConfig;
use crate::openai::OpenAiResponses;

/// Capability selected by configuration: live OpenAI when an API key is
/// set, otherwise a disabled stand-in that routes every phase to mock text.
pub fn build_capability(config: &CourtConfig) -> Result<Arc<dyn TextGenerationCapability>> {
    match OpenAiResponses::from_config(&config.provider)? {
        Some(live) => {
            info!(base_url = %live.base_url(), "Using OpenAI Responses capability");
            Ok(Arc::new(live))
        }
        None => {
            warn!("OPENAI_API_KEY not set; all phases will use mock replies");
            Ok(Arc::new(DisabledCapability::new("OPENAI_API_KEY not set")))
        }
    }
}

/// Orchestrator over `capability` with a fresh in-memory session store.
pub fn build_orchestrator_with(
    config: &CourtConfig,
    capability: Arc<dyn TextGenerationCapability>,
) -> Arc<TurnOrchestrator> {
    let adapter = Arc::new(ResilientAdapter::new(capability));
    Arc::new(TurnOrchestrator::with_config(
        SessionStore::new().shared(),
        adapter,
        config.phases.clone(),
    ))
}

/// Orchestrator over the capability `config` selects.
pub fn build_orchestrator(config: &CourtConfig) -> Result<Arc<TurnOrchestrator>> {
    Ok(build_orchestrator_with(config, build_capability(config)?))
}
