//! Service layer: construction and lifecycle of every long-lived component.

pub mod container;

pub use container::ServiceContainer;
