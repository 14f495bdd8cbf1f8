mod handler;
mod model;

pub use handler::{forgot_password, login, register, reset_password};
pub use model::{DEPARTMENTS, MessageResponse, validate_roll_number};
