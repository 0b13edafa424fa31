// lib.rs
pub mod alignment_record;
pub mod cigar;
pub mod commands;
pub mod consensus;
pub mod error;
pub mod indels;
pub mod output;
pub mod partition;
pub mod sam;
