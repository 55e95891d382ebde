pub mod simulated;
pub mod util;

pub use simulated::SimulatedRateSource;
