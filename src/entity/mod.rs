mod audit;
mod models;

pub use audit::{min_timestamp, stamp_create, stamp_delete, stamp_update, Audit, Tracked};
pub use models::{NewProject, NewUser, Project, User};
