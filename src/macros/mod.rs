//! Convenience macros
//!
//! - `pingorm_go!` runs a block on a `may` coroutine and binds its result
//! - `pingorm_txn!` runs a block inside a transaction, committing on `Ok`

pub mod go;
pub mod txn;

pub use go::run_in_coroutine;
