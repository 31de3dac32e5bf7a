pub mod document_store;
pub mod note_cache;
pub mod spreadsheet_cache;
pub mod view_cache;
pub mod whiteboard_cache;
