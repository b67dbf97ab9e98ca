pub mod backend_config;
pub mod guest_agent;
pub mod node_list_item;
pub mod snapshot;
pub mod task;
pub mod vm;
pub mod volume;
