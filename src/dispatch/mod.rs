//! Work-item dispatch: typed commands, executors and the throttled submit loop

pub mod command;
pub mod dispatcher;
pub mod executor;
pub mod manifest;

pub use command::{CommandBuilder, CommandLine, JobKind, ToolCommandBuilder, WorkItem, WorkTarget};
pub use dispatcher::{
    DispatchConfig, DispatchConfigBuilder, DispatchMode, DispatchRecord, DispatchReport,
    JobDispatcher, JobHandle, ThrottleConfig,
};
pub use executor::{JobRunner, ProcessJobRunner, ResourceSpec};
pub use manifest::DispatchManifest;
