mod handler;
mod model;

pub use handler::{create_event, delete_event, get_events, rsvp_event};
pub use model::{Event, EventView, parse_event_date};
