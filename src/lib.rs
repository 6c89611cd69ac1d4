// Giveaway Draw Engine
// Closes expired giveaways, picks ranked winners with a multi-stage weighted draw
// and credits their prizes

// Core modules
pub mod config;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod response;
pub mod state;
pub mod utils;

// Draw modules
pub mod draw_result;
pub mod engine;
pub mod randomness;

// Orchestration and collaborators
pub mod memory_store;
pub mod scanner;
pub mod settlement;
pub mod store;

pub use config::EngineConfig;
pub use error::DrawError;
pub use processor::Processor;
pub use response::Response;
pub use scanner::ExpiryScanner;
