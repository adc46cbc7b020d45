mod analyze;
mod config;
mod control;
mod crawl;
mod data_io;
mod error;
mod fetch;
mod keywords;
mod registry;
mod runtime;
mod scheduler;
#[cfg(test)]
mod testing;
mod types;

pub use runtime::run;
