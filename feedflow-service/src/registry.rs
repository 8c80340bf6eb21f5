// Instance Registry
// Run-scoped lookup of data objects and actions by id

use crate::action::Action;
use crate::data_object::DataObject;
use crate::error::ConfigError;

use std::collections::HashMap;
use std::sync::Arc;

/// Data objects and actions of one pipeline run.
///
/// Created per run and passed down explicitly, so independent runs never
/// share instances. `clear` tears everything down at the end of a run.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    data_objects: HashMap<String, Arc<dyn DataObject>>,
    actions: HashMap<String, Arc<dyn Action>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_data_object(
        &mut self,
        data_object: Arc<dyn DataObject>,
    ) -> Result<(), ConfigError> {
        let id = data_object.id().to_string();
        if self.data_objects.contains_key(&id) {
            return Err(ConfigError::invalid_structure(format!(
                "data object '{}' is registered twice",
                id
            )));
        }
        self.data_objects.insert(id, data_object);
        Ok(())
    }

    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<(), ConfigError> {
        let id = action.id().to_string();
        if self.actions.contains_key(&id) {
            return Err(ConfigError::invalid_structure(format!(
                "action '{}' is registered twice",
                id
            )));
        }
        self.actions.insert(id, action);
        Ok(())
    }

    pub fn data_object(&self, id: &str) -> Result<Arc<dyn DataObject>, ConfigError> {
        self.data_objects.get(id).cloned().ok_or_else(|| {
            ConfigError::unknown_data_object(format!("data object '{}' is not registered", id))
        })
    }

    pub fn action(&self, id: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(id).cloned()
    }

    pub fn contains_data_object(&self, id: &str) -> bool {
        self.data_objects.contains_key(id)
    }

    /// Registered data object ids, sorted
    pub fn data_object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.data_objects.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registered actions, sorted by id
    pub fn actions(&self) -> Vec<Arc<dyn Action>> {
        let mut actions: Vec<Arc<dyn Action>> = self.actions.values().cloned().collect();
        actions.sort_by(|a, b| a.id().cmp(b.id()));
        actions
    }

    pub fn clear(&mut self) {
        self.data_objects.clear();
        self.actions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data_objects.is_empty() && self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_object::MemoryDataObject;
    use crate::error::ConfigErrorKind;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = InstanceRegistry::new();
        registry
            .register_data_object(Arc::new(MemoryDataObject::new("src")))
            .unwrap();
        assert!(registry.contains_data_object("src"));
        assert_eq!(registry.data_object("src").unwrap().id(), "src");
        assert_eq!(registry.data_object_ids(), vec!["src"]);

        let err = registry.data_object("missing").unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownDataObject);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = InstanceRegistry::new();
        registry
            .register_data_object(Arc::new(MemoryDataObject::new("src")))
            .unwrap();
        let err = registry
            .register_data_object(Arc::new(MemoryDataObject::new("src")))
            .unwrap_err();
        assert!(err.message.contains("twice"));
    }

    #[test]
    fn test_runs_are_independent() {
        let mut first = InstanceRegistry::new();
        let second = InstanceRegistry::new();
        first
            .register_data_object(Arc::new(MemoryDataObject::new("src")))
            .unwrap();
        assert!(!second.contains_data_object("src"));

        first.clear();
        assert!(first.is_empty());
    }
}
