/// Version reported by `--version` and the status card.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
