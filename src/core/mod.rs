pub mod domain;
pub mod guest_ip;
pub mod infrastructure;
pub mod parser;
