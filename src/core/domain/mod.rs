pub mod backend;
pub mod context;
pub mod error;
pub mod model;
pub mod value_object;
