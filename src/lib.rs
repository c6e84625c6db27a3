pub mod backend;
pub mod clock;
pub mod config;
pub mod editing;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod mutations;
pub mod notify;
pub mod order_store;
pub mod poller;
pub mod reconcile;
pub mod state;
pub mod storage;

#[cfg(all(feature = "app", not(test)))]
mod cli;
#[cfg(test)]
mod testing;

#[cfg(all(feature = "app", not(test)))]
pub fn run() -> std::process::ExitCode {
    cli::main()
}
