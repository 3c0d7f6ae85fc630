pub mod cli;
pub mod logger;
pub mod metrics;
pub mod sampler;
pub mod server;
pub mod settings;
