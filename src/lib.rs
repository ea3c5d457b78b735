pub mod config;
pub mod engine;
pub mod geometry;
pub mod pose;
pub mod replay;
pub mod session;
pub mod spec;
