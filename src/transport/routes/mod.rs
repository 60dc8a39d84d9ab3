pub mod info;
pub mod rooms;
pub mod search;

pub use info::{get_info, get_stats, get_version};
pub use rooms::{get_room, list_rooms};
pub use search::search_tracks;
