pub mod analysis;
pub mod console;
