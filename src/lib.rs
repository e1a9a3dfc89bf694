pub mod cli;
pub mod command;
pub mod config;
pub mod repository;
pub mod run;

#[cfg(test)]
mod testing;
