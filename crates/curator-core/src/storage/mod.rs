pub mod container;
pub mod writer;
