pub mod async_handler;
pub mod cli;
pub mod core;
pub mod types;
pub mod utils;

// Re-export for easier access
pub use self::core::process_job;
pub use async_handler::run_async;
pub use cli::run_cli;
pub use types::*;
pub use utils::*;
