//! Stage trait, composition and the pipeline driver.

pub mod cancel;
pub mod chain;
pub mod close;
pub mod config;
pub mod context;
pub mod pipe;
pub mod runtime;
