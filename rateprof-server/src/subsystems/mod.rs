pub mod intake;
pub mod relay;
pub mod retrieve;
