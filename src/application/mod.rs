//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Services: Host services and plugin administration
//! - Errors: Domain-specific errors
//! - Messaging: Message parsing and dispatching

pub mod errors;
pub mod services;
pub mod messaging;
