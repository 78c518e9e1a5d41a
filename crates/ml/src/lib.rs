pub mod artifacts;
pub mod dataset;
pub mod forest;
pub mod kmeans;
pub mod model;
pub mod predictor;
pub mod recommendation;
pub mod trainer;
pub mod tree;

pub use artifacts::{ArtifactDocument, ArtifactDraft, ArtifactMeta, ArtifactStore};
pub use dataset::{resolve_dataset_path, ColumnInfo, ColumnKind, Dataset, DatasetSchema};
pub use model::{LabelEncoder, TrainedModel};
pub use predictor::predict_records;
pub use recommendation::{recommend, RecommendationRules};
pub use trainer::{resolve_features, resolve_problem_type, train, TrainOutcome};
