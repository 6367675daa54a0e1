// SHOREBENCH -- MULTI-INSTANCE SHORE-KITS BENCHMARK DRIVER
// PROVISIONS, PINS, DRIVES AND TEARS DOWN SEVERAL ENGINE PROCESSES PER RUN
//
// LIBRARY CORE: NO CLI, NO TEMPLATE FILE DISCOVERY. THE BINARY (main.rs)
// OWNS ARGUMENT PARSING AND LOGGING SETUP.

pub mod affinity;
pub mod catalog;
pub mod config;
pub mod control;
pub mod error;
pub mod instance;
pub mod results;
pub mod runner;
pub mod supervisor;

pub use error::{BenchError, Result};
