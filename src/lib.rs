pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod transmission;
pub mod util;
