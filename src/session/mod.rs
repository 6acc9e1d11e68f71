//! Session persistence across runs

pub mod store;

pub use store::{SessionState, SessionStore};
