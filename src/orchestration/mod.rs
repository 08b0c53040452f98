pub mod coordinator;

pub use coordinator::{PageProcessingCoordinator, PipelineSettings};
