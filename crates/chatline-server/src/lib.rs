pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, ServerConfig, ServerHandle, build_router, start};
