mod auth;
pub mod dto;
mod generate;
mod health;
mod keys;
mod models;
mod projects;
pub mod response;
mod router;
mod stats;
mod users;

pub use router::{AppState, create_router};
