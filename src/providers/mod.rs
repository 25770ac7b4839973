pub mod tefas;
pub mod util;
pub mod yahoo_finance;
