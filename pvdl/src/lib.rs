#[macro_use]
extern crate log;

pub mod config;
pub mod core;
pub mod hooks;
pub mod illust;
pub mod materialize;
pub mod pool;
pub mod resolve;
pub mod retry;
pub mod state;
mod util;
