pub mod plan;
pub mod validate;

use crate::output;

use std::path::Path;

use color_eyre::Result;
use feedflow_service::{ConfigError, ConfigParser, PipelineConfig};

/// Load a pipeline file, reporting parse failures in CLI style
pub(crate) fn load(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        color_eyre::eyre::bail!("Pipeline file not found: {}", path.display());
    }

    output::status("Loading", &format!("{}", path.display()));
    match ConfigParser::from_file(path) {
        Ok(config) => {
            tracing::debug!(
                path = %path.display(),
                pipeline = %config.name,
                actions = config.actions.len(),
                "Parsed pipeline configuration"
            );
            output::check("YAML syntax valid");
            Ok(config)
        }
        Err(e) => {
            output::error(&format!("Parse error: {}", e));
            std::process::exit(1);
        }
    }
}

/// Report configuration errors and exit with a failure status
pub(crate) fn fail_with(errors: &[ConfigError]) -> ! {
    output::error(&format!("{} configuration error(s):", errors.len()));
    for error in errors {
        output::error(&format!("  - [{:?}] {}", error.kind, error.message));
    }
    std::process::exit(1);
}
