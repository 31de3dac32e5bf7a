mod document_store_sqlx;

pub use document_store_sqlx::SqlxDocumentStore;
