pub mod job;
pub mod parsers;
pub mod progress;
pub mod stage;

// Re-export for easier access
pub use job::*;
pub use parsers::*;
pub use progress::*;
pub use stage::*;

/// Pretrained separation model every job runs with.
pub const SEPARATION_MODEL: &str = "htdemucs";
