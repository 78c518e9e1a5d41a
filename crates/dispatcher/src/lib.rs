pub mod pool;
pub mod reaper;

pub use pool::{WorkerPool, WorkerPoolConfig};
pub use reaper::{JobReaper, JobReaperConfig};
