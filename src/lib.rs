pub mod config;
pub mod llm;
pub mod logging;
pub mod planner;
pub mod research;
pub mod server;
pub mod tools;
pub mod util;
