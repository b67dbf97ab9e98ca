pub mod api_backend;
pub mod api_client;
pub mod command;
pub mod fake_backend;
pub mod shell_backend;
pub mod snippet_store;
pub mod task_waiter;
pub mod vm_params;
