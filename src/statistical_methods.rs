pub mod least_squares;
pub mod periodogram;
pub mod statistics;
