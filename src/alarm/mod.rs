pub mod model;
pub mod notify;
pub mod policy;
pub mod registry;
pub mod scheduler;
