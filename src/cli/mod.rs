pub mod rates;
pub mod refresh;
pub mod serve;
pub mod setup;
pub mod ui;
