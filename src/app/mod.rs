pub(crate) mod config;
pub(crate) mod progress;
pub(crate) mod runtime;
