pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod mail;
pub mod models;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod utils;
