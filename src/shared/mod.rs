pub mod clock;
pub mod config;
pub mod error;
pub mod single_flight;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use single_flight::SingleFlight;
