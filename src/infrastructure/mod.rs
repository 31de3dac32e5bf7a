pub mod cache;
pub mod db;
pub mod fetch;
pub mod realtime;
pub mod worker;
