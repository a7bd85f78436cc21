pub mod analyze;
pub mod momentum;
pub mod scenarios;
pub mod train;
pub mod validate;
