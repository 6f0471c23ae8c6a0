pub mod delivery_state;
pub mod errors;
pub mod instrument_state;
pub mod pip;
pub mod ports;
pub mod position;
pub mod repositories;
pub mod signal;
pub mod subscription;
pub mod types;

pub use errors::CoreError;
pub use signal::Signal;
pub use types::{Candle, Instrument, Prediction, Timeframe};
