pub mod command;
pub mod orchestrator;
pub mod scheduler;
pub mod stage;
pub mod stages;

pub use command::{run_command, CommandOutput, CommandSpec};
pub use orchestrator::{Pipeline, PipelineError, RunReport, StageRecord, Trigger};
pub use scheduler::build_scheduler;
pub use stage::{StageError, StageId, StageOutput, StageStatus, UnitOfWork};
pub use stages::{CommandStage, DetectAndLoadStage, LoadRawStage, TransformStage, TransformStep};
