mod extraction;
mod progress;

pub use extraction::{DEFAULT_FRAME_TIMEOUT, ExtractionStats, TrialDescriptor, TrialExtractor};
pub use progress::{ProgressBoard, TrialProgress};
