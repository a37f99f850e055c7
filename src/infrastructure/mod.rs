//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Host configuration loading
//! - Plugins: Plugin code loading, plugin config files and discovery
//! - Adapters: Bot API clients (Telegram, console)

pub mod adapters;
pub mod config;
pub mod plugins;
