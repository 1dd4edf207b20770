pub mod toolservice;
pub mod tools;
