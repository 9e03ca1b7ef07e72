use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::StylistError;

/// The closed set of models the stylist may talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-3-flash")]
    Gemini3Flash,
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,
}

impl ModelId {
    /// Listing order is the order the settings menu shows them in.
    pub const ALL: [ModelId; 3] = [
        ModelId::Gemini25Flash,
        ModelId::Gemini3Flash,
        ModelId::Gemini20Flash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::Gemini25Flash => "gemini-2.5-flash",
            ModelId::Gemini3Flash => "gemini-3-flash",
            ModelId::Gemini20Flash => "gemini-2.0-flash",
        }
    }

    pub fn supported_names() -> Vec<String> {
        Self::ALL
            .iter()
            .map(|model| model.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = StylistError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix("models/").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == normalized)
            .ok_or_else(|| StylistError::UnsupportedModel {
                name: raw.trim().to_string(),
                supported: Self::supported_names(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: ModelId,
    /// Name sent on the wire; preview releases differ from the display name.
    pub transport_name: String,
}

impl ModelSpec {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<ModelId, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<ModelId, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelSpec> {
        self.models.get(&id)
    }

    pub fn lookup(&self, name: &str) -> Result<&ModelSpec, StylistError> {
        let unsupported = || StylistError::UnsupportedModel {
            name: name.trim().to_string(),
            supported: self.names(),
        };
        let id = ModelId::from_str(name).map_err(|_| unsupported())?;
        self.get(id).ok_or_else(unsupported)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.models
            .keys()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    pub fn default_model(&self) -> Option<&ModelSpec> {
        self.get(ModelId::default()).or_else(|| self.models.values().next())
    }
}

fn default_models() -> IndexMap<ModelId, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |id: ModelId, transport_name: &str| {
        map.insert(
            id,
            ModelSpec {
                id,
                transport_name: transport_name.to_string(),
            },
        );
    };

    insert(ModelId::Gemini25Flash, "gemini-2.5-flash");
    insert(ModelId::Gemini3Flash, "gemini-3-flash-preview");
    insert(ModelId::Gemini20Flash, "gemini-2.0-flash");

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_names_case_insensitively() {
        assert_eq!("gemini-2.5-flash".parse::<ModelId>(), Ok(ModelId::Gemini25Flash));
        assert_eq!(" Gemini-3-Flash ".parse::<ModelId>(), Ok(ModelId::Gemini3Flash));
        assert_eq!(
            "models/gemini-2.0-flash".parse::<ModelId>(),
            Ok(ModelId::Gemini20Flash)
        );
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "gpt-4o-mini".parse::<ModelId>().err();
        assert_eq!(
            err,
            Some(StylistError::UnsupportedModel {
                name: "gpt-4o-mini".to_string(),
                supported: ModelId::supported_names(),
            })
        );
    }

    #[test]
    fn default_registry_keeps_menu_order_and_transport_names() {
        let registry = ModelRegistry::default();
        assert_eq!(
            registry.names(),
            vec!["gemini-2.5-flash", "gemini-3-flash", "gemini-2.0-flash"]
        );
        assert_eq!(
            registry.default_model().map(ModelSpec::name),
            Some("gemini-2.5-flash")
        );
        let preview = registry.lookup("gemini-3-flash").map(|spec| spec.transport_name.clone());
        assert_eq!(preview, Ok("gemini-3-flash-preview".to_string()));
        let stable = registry.lookup("gemini-2.0-flash").map(|spec| spec.transport_name.clone());
        assert_eq!(stable, Ok("gemini-2.0-flash".to_string()));
    }

    #[test]
    fn restricted_registry_rejects_models_outside_its_table() {
        let mut models = IndexMap::new();
        let spec = ModelRegistry::default()
            .get(ModelId::Gemini20Flash)
            .cloned()
            .unwrap();
        models.insert(ModelId::Gemini20Flash, spec);
        let registry = ModelRegistry::new(Some(models));

        assert!(registry.lookup("gemini-2.0-flash").is_ok());
        let err = registry.lookup("gemini-2.5-flash").err();
        assert_eq!(
            err,
            Some(StylistError::UnsupportedModel {
                name: "gemini-2.5-flash".to_string(),
                supported: vec!["gemini-2.0-flash".to_string()],
            })
        );
        assert_eq!(
            registry.default_model().map(ModelSpec::name),
            Some("gemini-2.0-flash")
        );
    }
}
