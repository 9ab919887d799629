/// Database access
///
/// - `pool`: connection pool creation and health check
/// - `migrations`: embedded schema migrations
///
/// Queries live with the models in [`crate::models`].

pub mod migrations;
pub mod pool;
