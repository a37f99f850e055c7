//! Domain layer - Core business objects and abstractions
//! 
//! This layer contains:
//! - Entities: Core business objects (User, Message)
//! - Traits: Abstractions for infrastructure (BotApi)

pub mod entities;
pub mod traits;
