pub mod driver;
pub mod pool;
pub mod privacy;
pub mod registry;
pub mod remote;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testing;
