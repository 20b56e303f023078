pub mod app;
pub mod auth;
pub mod config;
pub mod deployment;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod transform;
pub mod upstream;
