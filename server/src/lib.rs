// Library exports for testing and reuse

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod session;
