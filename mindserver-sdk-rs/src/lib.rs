pub mod behaviors;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod logger;
pub mod protocol;
pub mod providers;
pub mod proxy;
pub mod session;
pub mod transport;
