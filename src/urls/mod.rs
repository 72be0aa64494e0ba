// URL handling — cleaning/filter rules and redirect resolution.

pub mod redirect;
pub mod rules;

pub use rules::{clean, hostname, process_url, ProcessedUrl};
