pub mod executors;
pub mod service;

pub use executors::{
    ExecutionContext, ExecutionOutcome, JobExecutor, PredictExecutor, ProgressReporter,
    TrainExecutor,
};
pub use service::{default_worker_id, WorkerService, WorkerServiceBuilder};
