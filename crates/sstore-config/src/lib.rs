pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, HOME_ENV_VAR};
pub use model::{ResolvedPaths, SstoreConfig};
