mod broadcaster;
pub mod supervisor;
mod worker;
