// Pipeline Configuration Parser
// Loads YAML pipeline files and checks them before any graph is built

use crate::config::models::{ActionKind, PipelineConfig};
use crate::error::{ConfigError, ConfigErrorKind, ServiceResult};

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// YAML pipeline configuration parser
pub struct ConfigParser;

impl ConfigParser {
    /// Parse a pipeline from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ServiceResult<PipelineConfig> {
        let config: PipelineConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Parse a pipeline from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServiceResult<PipelineConfig> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }
}

/// Structural checks on a parsed pipeline
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate every action, collecting all problems found
    pub fn validate(config: &PipelineConfig) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if config.actions.is_empty() {
            errors.push(ConfigError::invalid_structure(format!(
                "pipeline '{}' declares no actions",
                config.name
            )));
        }

        for (id, action) in &config.actions {
            if action.outputs.is_empty() {
                errors.push(ConfigError::invalid_structure(format!(
                    "action '{}' declares no outputs",
                    id
                )));
            }

            match action.kind {
                ActionKind::Copy if action.inputs.len() != 1 => {
                    errors.push(ConfigError::feed_count(id, "input", 1, action.inputs.len()));
                }
                ActionKind::Copy if action.outputs.len() > 1 => {
                    errors.push(ConfigError::feed_count(id, "output", 1, action.outputs.len()));
                }
                ActionKind::Multi if action.inputs.is_empty() => {
                    errors.push(ConfigError::invalid_structure(format!(
                        "action '{}' declares no inputs",
                        id
                    )));
                }
                _ => {}
            }

            Self::check_duplicates(id, "input", &action.inputs, &mut errors);
            Self::check_duplicates(id, "output", &action.outputs, &mut errors);

            if !config.data_objects.is_empty() {
                for object in action.inputs.iter().chain(&action.outputs) {
                    if !config.data_objects.contains_key(object) {
                        errors.push(ConfigError::unknown_data_object(format!(
                            "action '{}' references unknown data object '{}'",
                            id, object
                        )));
                    }
                }
            }

            if let Some(main) = action.explicit_main_input() {
                if !action.inputs.iter().any(|i| i == main) {
                    errors.push(ConfigError::new(
                        ConfigErrorKind::AmbiguousMainInput,
                        format!(
                            "action '{}' names main input '{}' which is not one of its inputs [{}]",
                            id,
                            main,
                            action.inputs.join(", ")
                        ),
                    ));
                }
            }
            if let Some(main) = action.explicit_main_output() {
                if !action.outputs.iter().any(|o| o == main) {
                    errors.push(ConfigError::new(
                        ConfigErrorKind::AmbiguousMainOutput,
                        format!(
                            "action '{}' names main output '{}' which is not one of its outputs [{}]",
                            id,
                            main,
                            action.outputs.join(", ")
                        ),
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_duplicates(id: &str, what: &str, ids: &[String], errors: &mut Vec<ConfigError>) {
        let mut seen = HashSet::new();
        for object in ids {
            if !seen.insert(object) {
                errors.push(ConfigError::invalid_structure(format!(
                    "action '{}' lists {} '{}' more than once",
                    id, what, object
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_mode::ExecutionModeConfig;
    use std::io::Write;

    const SALES: &str = r#"
name: sales
global:
  parallelism: 2
data_objects:
  src1: { partitions: [p] }
  src2: {}
  tgt: { partitions: [p] }
actions:
  load:
    type: multi
    inputs: [src1, src2]
    outputs: [tgt]
    break_lineage: true
    execution_mode:
      type: partition_diff
      main_input: src1
"#;

    #[test]
    fn test_parse_pipeline() {
        let config = ConfigParser::from_str(SALES).unwrap();

        assert_eq!(config.name, "sales");
        assert_eq!(config.global.parallelism, 2);
        assert!(config.global.continue_on_error);
        assert!(config.is_partitioned("src1"));
        assert!(!config.is_partitioned("src2"));

        let load = &config.actions["load"];
        assert_eq!(load.kind, ActionKind::Multi);
        assert!(load.break_lineage);
        assert_eq!(load.transformer_name(), "union");
        assert_eq!(load.explicit_main_input(), Some("src1"));
        assert!(matches!(
            load.execution_mode,
            Some(ExecutionModeConfig::PartitionDiff { .. })
        ));
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SALES.as_bytes()).unwrap();

        let config = ConfigParser::from_file(file.path()).unwrap();
        assert_eq!(config.actions.len(), 1);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(ConfigParser::from_str("name: [unclosed").is_err());
        assert!(ConfigParser::from_file("/nonexistent/pipeline.yml").is_err());
    }

    #[test]
    fn test_validation_collects_errors() {
        let config = ConfigParser::from_str(
            r#"
name: broken
data_objects:
  a: {}
  b: {}
actions:
  copy-two:
    type: copy
    inputs: [a, b]
    outputs: [c]
  no-outputs:
    type: multi
    inputs: [a]
  wrong-main:
    type: multi
    inputs: [a, b]
    outputs: [d]
    main_input: z
"#,
        )
        .unwrap();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        let kinds: Vec<&ConfigErrorKind> = errors.iter().map(|e| &e.kind).collect();

        assert!(kinds.contains(&&ConfigErrorKind::FeedCountMismatch));
        assert!(kinds.contains(&&ConfigErrorKind::UnknownDataObject));
        assert!(kinds.contains(&&ConfigErrorKind::InvalidStructure));
        assert!(kinds.contains(&&ConfigErrorKind::AmbiguousMainInput));
    }

    #[test]
    fn test_undeclared_data_objects_allowed_without_section() {
        let config = ConfigParser::from_str(
            r#"
name: loose
actions:
  copy:
    type: copy
    inputs: [a]
    outputs: [b]
"#,
        )
        .unwrap();
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
