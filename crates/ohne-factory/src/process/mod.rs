pub mod core;
pub mod types;
pub mod utils;

// Re-export for easier access
pub use self::core::*;
pub use types::*;
pub use utils::*;
