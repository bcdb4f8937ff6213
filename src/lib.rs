pub mod batch;
pub mod config;
pub mod display;
pub mod error_codes;
pub mod events;
pub mod flame;
pub mod locate;
pub mod options;
pub mod progress;
pub mod resize;
pub mod session;
pub mod tokenizer;
