pub mod annotate;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dom;
pub mod ebook;
pub mod engine;
pub mod interaction;
pub mod locations;
pub mod logging;
pub mod models;
pub mod parser;
pub mod pattern;
pub mod reader;
pub mod session;
pub mod settings;
pub mod vocabulary;
