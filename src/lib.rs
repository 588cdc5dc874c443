pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;
