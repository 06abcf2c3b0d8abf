pub mod backend;
pub mod cli;
pub mod delta;
pub mod error;
pub mod kinematics;
pub mod landmarks;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod quality;
pub mod result;
pub mod sampler;
pub mod settings;
pub mod signal;
pub mod stage;
pub mod summary;
pub mod sync;
pub mod trial;

pub use error::{AnalysisError, AnalysisResult, TrialLabel};
pub use pipeline::{ComparisonRequest, PipelineConfig, TrialInput, compare_series, run_comparison};
pub use result::ComparisonResult;
pub use trial::{TestType, TrialSeries};
