pub mod analytics;
pub mod api;
pub mod app;
pub mod config;
pub mod cursor;
pub mod error;
pub mod models;
pub mod redirect;
pub mod resolver;
pub mod shortener;
pub mod storage;
