pub mod consensus;
pub mod indels;
