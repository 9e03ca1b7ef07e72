use super::registry::{ModelRegistry, ModelSpec};
use crate::errors::StylistError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    /// Set whenever the registry default stands in for the caller's choice.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    /// Unknown names are an error, never a silent fallback. Only an absent
    /// request falls back to the registry default.
    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, StylistError> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(requested_value) = requested {
            let model = self.registry.lookup(requested_value)?.clone();
            return Ok(ModelSelection {
                model,
                fallback_reason: None,
            });
        }

        let Some(model) = self.registry.default_model().cloned() else {
            return Err(StylistError::UnsupportedModel {
                name: String::new(),
                supported: Vec::new(),
            });
        };
        Ok(ModelSelection {
            model,
            fallback_reason: Some("No model specified; using default.".to_string()),
        })
    }

    /// Like `select`, but an unsupported name falls back to the default and
    /// the refusal is carried in `fallback_reason`.
    pub fn select_or_default(&self, requested: Option<&str>) -> Result<ModelSelection, StylistError> {
        match self.select(requested) {
            Err(err @ StylistError::UnsupportedModel { .. }) if requested.is_some() => {
                let mut selection = self.select(None)?;
                selection.fallback_reason = Some(format!(
                    "{err}; using default {}.",
                    selection.model.name()
                ));
                Ok(selection)
            }
            other => other,
        }
    }
}
