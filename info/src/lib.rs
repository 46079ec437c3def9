//! Build metadata shared by the server, the logger and the admin routes.

pub const NAME: &str = "touris";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const REVISION: Option<&str> = option_env!("TOURIS_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("TOURIS_BUILD_TIMESTAMP");
