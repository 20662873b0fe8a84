pub mod config;
pub mod feed;
pub mod gallery;
pub mod scheduler;
pub mod status;
