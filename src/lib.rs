// Module layout (Clean Architecture style)
// - bootstrap: configuration and startup
// - infrastructure: DB/cache/realtime/fetch adapters
// - presentation: HTTP/WS handlers and routing
// - application: ports shared between layers
// - domain: core models

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
