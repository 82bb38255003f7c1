pub mod client;
pub mod tester;
