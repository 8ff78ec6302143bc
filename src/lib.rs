pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod email;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod posts;
pub mod slug;
pub mod store;
pub mod submissions;
pub mod webhook;
