pub mod compile;
pub mod config;
pub mod drift;
pub mod items;
pub mod state;
