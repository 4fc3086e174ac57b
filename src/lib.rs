pub mod bus;
pub mod checks;
pub mod parser;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod utils;

// Re-export common items
pub use bus::{LocalBus, MessageBus, RosbridgeBus};
pub use checks::{SuiteResult, SurfaceInput, TestKind, TestResult};
pub use parser::SuiteDefinition;
pub use runner::{SuiteExecutor, SuiteHandle};
pub use utils::config::Config;
