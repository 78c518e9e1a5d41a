pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;

pub use error::{ApiError, ApiResult};
pub use response::{ArtifactListResponse, CancelJobResponse, JobSnapshot, SubmitJobResponse};
pub use routes::{create_routes, AppState};
pub use service::JobService;
