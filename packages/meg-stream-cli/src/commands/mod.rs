pub mod config;
pub mod projector;
pub mod run;
