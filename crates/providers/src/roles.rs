//! Role → model resolution.
//!
//! Each pipeline stage talks to its own [`LanguageModel`] handle so that
//! the classifier can run a small model while the planner and responder
//! run larger ones. Unassigned roles fall back to the default model.

use std::sync::Arc;

use trellis_domain::config::LlmConfig;
use trellis_domain::error::Result;
use trellis_ports::llm::LanguageModel;

use crate::openai_compat::OpenAiCompatModel;

/// One handle per pipeline role.
#[derive(Clone)]
pub struct ModelRoles {
    pub classifier: Arc<dyn LanguageModel>,
    pub planner: Arc<dyn LanguageModel>,
    pub responder: Arc<dyn LanguageModel>,
    pub evaluator: Arc<dyn LanguageModel>,
    pub summarizer: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn LanguageModel>,
}

impl ModelRoles {
    /// Build the role set from config. Handles sharing a model id still
    /// get separate adapters; the underlying HTTP pool is per-adapter and
    /// cheap.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let resolve = |role: &Option<String>| -> Result<Arc<dyn LanguageModel>> {
            let model = role.as_deref().unwrap_or(&cfg.default_model);
            Ok(Arc::new(OpenAiCompatModel::from_config(cfg, model)?))
        };

        Ok(Self {
            classifier: resolve(&cfg.roles.classifier)?,
            planner: resolve(&cfg.roles.planner)?,
            responder: resolve(&cfg.roles.responder)?,
            evaluator: resolve(&cfg.roles.evaluator)?,
            summarizer: resolve(&cfg.roles.summarizer)?,
            embedder: resolve(&cfg.roles.embedder)?,
        })
    }

    /// Build a role set where every role shares one handle. Used by tests
    /// with scripted models.
    pub fn uniform(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            classifier: model.clone(),
            planner: model.clone(),
            responder: model.clone(),
            evaluator: model.clone(),
            summarizer: model.clone(),
            embedder: model,
        }
    }
}
