pub mod clock;
pub mod config;
pub mod error;
pub mod pack;
pub mod quiz;
pub mod route;
pub mod schema;
pub mod session;
pub mod store;
pub mod tab;
