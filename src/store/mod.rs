//! Persistence-adjacent state that outlives a connection

mod sessions;

pub use sessions::SessionStore;
