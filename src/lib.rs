// esclient - An Elasticsearch client for Rust
//
// This library provides a connection pool with pluggable selection strategies,
// failover across nodes, and HTTP transports with persistent handle reuse.

// Re-export core functionality
pub use esclient_core::*;

/// Prelude for common imports.
///
/// ```
/// use esclient::prelude::*;
/// ```
pub mod prelude {
    pub use esclient_core::prelude::*;
}
