pub mod config;
pub mod data;
pub mod dataset;
pub mod env;
pub mod error;
pub mod evaluation;
pub mod observation;
pub mod policy;
pub mod records;
pub mod simulator;
pub mod travel_times;
pub mod wrappers;
