pub mod lead;
pub mod record;
pub mod strategy;
