mod handler;
mod model;

pub use handler::{create_group, delete_group, get_group, get_groups, join_group, remove_member};
pub use model::{Group, GroupView, Privacy};
