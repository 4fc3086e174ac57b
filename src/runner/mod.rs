pub mod confirmation;
pub mod events;
pub mod executor;
pub mod machine;
pub mod state;

pub use confirmation::{ConfirmationGateway, ConfirmationWait, GatewayError};
pub use events::*;
pub use executor::{Command, OrchestratorError, SuiteExecutor, SuiteHandle};
pub use machine::{reduce, Action, Effect, TransitionError};
pub use state::*;
