mod handler;
mod model;

pub use handler::{get_user, search_users, update_user};
pub use model::{CreatorRef, Directory, NewUser, User, UserSummary};
