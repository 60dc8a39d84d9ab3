pub mod app_state;
pub mod connection;
pub mod gateway;

pub use app_state::AppState;
pub use connection::{Binding, Connection};
