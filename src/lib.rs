pub mod config;
pub mod db;
pub mod error;
pub mod google_auth;
pub mod handlers;
pub mod http_client;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
