/// Run a block inside a transaction on one connection key, committing when
/// the block returns `Ok` and rolling back otherwise.
///
/// The transaction is bound to the name given before the block and
/// implements [`Executor`](crate::Executor). Nested use on the same key
/// becomes a savepoint.
///
/// # Example
///
/// ```ignore
/// let moved = pingorm_txn!(factory, "main", |txn| {
///     mapper::non_query(&txn, "UPDATE stock SET qty = qty - 1 WHERE id = :id", &[("id", 7.into())])?;
///     mapper::non_query(&txn, "INSERT INTO picks (stock_id) VALUES (:id)", &[("id", 7.into())])
/// })?;
/// ```
#[macro_export]
macro_rules! pingorm_txn {
    ($factory:expr, $key:expr, |$txn:ident| $block:block) => {{
        match $factory.begin($key) {
            Ok($txn) => {
                let out: ::std::result::Result<_, $crate::OrmError> = (|| $block)();
                match out {
                    Ok(value) => $txn.commit().map(|()| value).map_err($crate::OrmError::from),
                    Err(e) => {
                        ::std::mem::drop($txn);
                        Err(e)
                    }
                }
            }
            Err(e) => Err($crate::OrmError::from(e)),
        }
    }};
}
