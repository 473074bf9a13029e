pub mod clock;
pub mod fsutils;
