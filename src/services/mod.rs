/// Power activation intake.
pub mod activation_service;
/// Battle lifecycle operations and the optimistic commit loop.
pub mod battle_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Participant and template seeding.
pub mod roster_service;
/// Cancellable delayed tasks keyed by session.
pub mod scheduler;
/// Server-Sent Events session streams.
pub mod sse_service;
/// Session store connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Client projections of stored sessions.
pub mod view_service;
