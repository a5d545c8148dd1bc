//! # Fortress
//!
//! A multi-tenant gateway for text-generation workloads: tenant accounts,
//! API-key lifecycle, usage metering and a pass-through to the model server.
//! Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fortress::config::ServerConfig;
//! use fortress::server::{AppState, create_router};
//! use fortress::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/fortress.db").unwrap();
//! store.initialize().unwrap();
//!
//! let handle = fortress::metrics::install().unwrap();
//! let config = ServerConfig {
//!     host: "127.0.0.1".into(),
//!     port: 8080,
//!     data_dir: "./data".into(),
//!     model_server_url: "http://127.0.0.1:8188".into(),
//!     hub_base_url: "https://huggingface.co".into(),
//!     session_secret: "change-me".into(),
//! };
//! let state = Arc::new(AppState::new(Arc::new(store), config, handle).unwrap());
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod inference;
pub mod jobs;
pub mod metrics;
pub mod server;
pub mod store;
pub mod types;
