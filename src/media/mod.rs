pub mod probe;
pub mod tool;
