pub mod chart;
pub mod config;
pub mod export;
pub mod interpret;
pub mod journal;
pub mod nse;
pub mod session;
pub mod types;
