pub mod types;
pub mod yaml;

pub use types::{DefinitionError, SuiteDefinition, TestStepDescriptor};
pub use yaml::{parse_suite_content, parse_suite_file, parse_trace_file};
