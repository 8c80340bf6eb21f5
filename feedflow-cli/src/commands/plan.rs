use crate::commands::{fail_with, load};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use feedflow_service::{ExecutorConfig, PipelineBuilder};

/// Show the execution plan of a pipeline
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the pipeline YAML file
    pub config: PathBuf,

    /// Show main inputs, modes and transformers for each action
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let config = load(&args.config)?;

    let graph = match PipelineBuilder::new().plan(&config) {
        Ok(graph) => graph,
        Err(e) => fail_with(&[e]),
    };
    let executor = ExecutorConfig::from(&config.global);
    let parallelism = match executor.parallelism {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };

    output::header(&format!("Plan for '{}'", config.name));
    output::info(&format!(
        "parallelism {}, continue on error: {}",
        parallelism, executor.continue_on_error
    ));
    println!();

    for (index, level) in graph.parallel_levels().iter().enumerate() {
        output::level_header(index + 1, level.len());
        for node in level {
            let plan = &node.action;
            output::action_line(
                &plan.id,
                &format!(
                    "[{}] {} -> {}",
                    plan.kind,
                    plan.inputs.join(", "),
                    plan.outputs.join(", ")
                ),
            );

            if args.verbose {
                output::detail("transformer", &plan.transformer);
                output::detail(
                    "main input",
                    plan.main_input.as_deref().unwrap_or("(ambiguous)"),
                );
                output::detail(
                    "main output",
                    plan.main_output.as_deref().unwrap_or("(ambiguous)"),
                );
                if let Some(mode) = &plan.execution_mode {
                    output::detail("mode", mode);
                }
                if !node.start_inputs.is_empty() {
                    output::detail("start inputs", &node.start_inputs.join(", "));
                }
                if plan.break_lineage {
                    output::detail("lineage", "re-read inputs from storage");
                }
            }
        }
    }

    println!();
    output::success(&format!("{} actions planned", graph.len()));

    Ok(())
}
