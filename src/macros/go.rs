use crate::error::OrmError;
use std::any::Any;

/// Run `work` on a new coroutine and wait for it
///
/// # Errors
///
/// Returns the closure's error, or `OrmError::QueryError` if the coroutine
/// panicked.
pub fn run_in_coroutine<T, F>(work: F) -> Result<T, OrmError>
where
    F: FnOnce() -> Result<T, OrmError> + Send + 'static,
    T: Send + 'static,
{
    let handle = may::go!(work);
    handle.join().map_err(|panic| {
        OrmError::QueryError(format!("coroutine panicked: {}", panic_message(&*panic)))
    })?
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown payload"
    }
}

/// Spawn a `may` coroutine, run a block in it, and bind the result to a
/// name you choose.
///
/// The block must evaluate to `Result<T, OrmError>`; captured values are
/// moved in.
///
/// # Example
///
/// ```ignore
/// let users = Arc::clone(&factory);
/// pingorm_go!(count, {
///     let session = users.current_session("main")?;
///     QueryBuilder::<User>::new()?.count(&*session)
/// });
/// println!("{} users", count?);
/// ```
#[macro_export]
macro_rules! pingorm_go {
    ($ret:ident, $block:block) => {
        let $ret = $crate::macros::run_in_coroutine(move || $block);
    };
}

#[cfg(test)]
mod tests {
    use crate::error::OrmError;

    #[test]
    fn test_go_binds_result() {
        let base = 40;
        pingorm_go!(answer, { Ok::<_, OrmError>(base + 2) });
        assert_eq!(answer.unwrap(), 42);
    }

    #[test]
    fn test_go_propagates_error() {
        pingorm_go!(failed, {
            Err::<(), _>(OrmError::QueryError("no route".to_string()))
        });
        assert_eq!(failed.unwrap_err().to_string(), "Query error: no route");
    }
}
