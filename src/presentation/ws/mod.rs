mod ws;
pub use ws::*;
