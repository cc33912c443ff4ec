pub mod config;
pub mod error;
pub mod finalizer;
pub mod pipeline;
pub mod process;
pub mod telemetry;
pub mod tools;
pub mod workspace;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineFailure};
pub use pipeline::{
    process_job, run_async, run_cli, sinks, JobHandle, PipelineArgs, PipelineStatus,
};
pub use process::{CancelToken, CommandPrefix};
pub use telemetry::{init_logging, LogFormat, LoggingConfig};
pub use tools::{run_check_cli, ToolCommands};
pub use workspace::WorkspaceLayout;
