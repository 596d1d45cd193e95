//! Integration tests exercising cross-component behavior: an upstream
//! session against a mock venue socket, and the fan-out broker's debounce
//! under concurrent connects.

pub mod common;
