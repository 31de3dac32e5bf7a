mod client;
mod hub;
mod note_room;
mod room;
mod spreadsheet_room;
mod whiteboard_room;
mod yjs_room;

pub use client::*;
pub use hub::*;
pub use note_room::*;
pub use room::*;
pub use spreadsheet_room::*;
pub use whiteboard_room::*;
pub use yjs_room::*;
