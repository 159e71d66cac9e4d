//! EPD core: pure job state machine, progress aggregation and status views.
mod chunk;
mod effect;
mod error;
mod msg;
mod progress;
mod settings;
mod state;
mod update;
mod view_model;

pub use chunk::{ChunkId, ChunkOutcome, ChunkStatus, ChunkTask};
pub use effect::{Effect, FinalizeOutcome, MergeDecision};
pub use error::{ControlAction, ControlError};
pub use msg::Msg;
pub use progress::{running_percent, ProgressAggregator};
pub use settings::{FilterSettings, Settings, SettingsField, ValidationError};
pub use state::{ControllerState, Job, JobId, JobResultKind, JobState};
pub use update::update;
pub use view_model::{ChunkRowView, JobView, StatusEvent};
