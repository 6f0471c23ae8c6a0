pub mod cache;
pub mod core;
pub mod delivery;
pub mod observability;
pub mod persistence;
pub mod predictor;
pub mod upstream;
