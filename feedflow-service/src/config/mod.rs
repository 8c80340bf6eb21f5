// Configuration module
// YAML pipeline files: models, parsing, validation and graph building

pub mod builder;
pub mod models;
pub mod parser;

pub use builder::{ActionPlan, PipelineBuilder};
pub use models::*;
pub use parser::{ConfigParser, ConfigValidator};
