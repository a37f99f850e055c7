//! nocto - a chat bot host built around hot-reloadable plugins

pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
