pub mod config;
pub mod dispatch;
mod input;
pub mod run;
