pub mod app;
pub mod bot;
pub mod bridge;
pub mod config;
pub mod error;
pub mod hub;
pub mod relay;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils {
    pub mod jwt;
    pub mod password;
}
