pub mod classifier;
pub mod services;
