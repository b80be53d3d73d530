pub mod app;
pub mod cli;
pub mod config;
pub mod download;
pub mod errors;
pub mod gmail;
pub mod oauth;
pub mod parse;
pub mod storage;
pub mod types;
