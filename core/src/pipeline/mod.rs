pub mod debounce;
pub mod orchestrator;
pub mod state;

pub use debounce::{CommitGate, DEFAULT_DEBOUNCE};
pub use orchestrator::{Pipeline, SettingsEdit};
pub use state::{StageId, StageState};
