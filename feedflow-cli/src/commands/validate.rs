use crate::commands::{fail_with, load};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use feedflow_service::{ConfigValidator, PipelineBuilder};

/// Validate a pipeline configuration file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the pipeline YAML file
    pub config: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    // Step 1: Parse YAML syntax
    let config = load(&args.config)?;

    output::check(&format!(
        "Structure: {} data objects, {} actions",
        config.data_objects.len(),
        config.actions.len()
    ));
    if config.data_objects.is_empty() {
        output::warning("No data objects declared, data object ids are not checked");
    }

    // Step 2: Structural validation
    if let Err(errors) = ConfigValidator::validate(&config) {
        fail_with(&errors);
    }
    output::check("Action definitions valid");

    // Step 3: Transformers, main inputs and the dependency graph
    let graph = match PipelineBuilder::new().plan(&config) {
        Ok(graph) => graph,
        Err(e) => fail_with(&[e]),
    };
    output::check(&format!(
        "Dependency graph acyclic: {} actions in {} levels",
        graph.len(),
        graph.parallel_levels().len()
    ));

    for node in &graph.nodes {
        if node.action.main_input.is_none() && node.action.inputs.len() > 1 {
            output::info(&format!(
                "Action '{}' has no main input; partition values are not inherited",
                node.action.id
            ));
        }
    }

    println!();
    output::success(&format!("Pipeline '{}' is valid", config.name));

    Ok(())
}
