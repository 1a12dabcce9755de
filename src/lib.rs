pub mod aggregate;
pub mod config;
pub mod errors;
pub mod power_curve;
pub mod production;
pub mod schema;
pub mod swi;
pub mod temporal;

#[cfg(test)]
mod tests;
