//! Application services - host-side services and plugin administration

pub mod plugin_control;
pub mod registry;
pub mod throttle;

pub use plugin_control::{ControlOperation, PluginControl};
pub use registry::{FilterVerdict, Service, ServiceRegistry};
pub use throttle::ThrottleService;
