/// Backend agnostic stored documents.
pub mod models;
/// Session store abstraction and its implementations.
pub mod session_store;
/// Storage error types shared by every backend.
pub mod storage;
