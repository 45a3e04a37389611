#![forbid(unsafe_code)]

pub mod config;
pub mod dataloader;
pub mod logging;
pub mod scheduler;
