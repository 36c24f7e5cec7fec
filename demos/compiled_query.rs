//! Compiles one query shape and re-binds it per call.
//!
//! Prints the SQL for every dialect. With `PINGORM_DATABASE_URL` set, also
//! runs the Postgres variant.
//!
//! ```sh
//! cargo run --example compiled_query
//! ```

use pingorm::query::{Arg, CompiledQuery};
use pingorm::{DataEntity, Dialect, MayPostgresExecutor, OrmError, QueryBuilder};

#[derive(Debug, Default, Clone, DataEntity)]
#[table_name = "users"]
pub struct User {
    #[primary_key]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub num_logins: i32,
}

fn active_users(dialect: Dialect) -> Result<CompiledQuery<User, (i32, Vec<String>)>, OrmError> {
    CompiledQuery::compile(
        ["min_logins", "names"],
        move |(min_logins, names): (Arg<i32>, Arg<Vec<String>>)| {
            QueryBuilder::with_dialect(dialect)?
                .filter(User::NUM_LOGINS.ge(min_logins))?
                .filter(User::LAST_NAME.is_in(names))?
                .order_by_desc(User::NUM_LOGINS)
                .map(|query| query.take(20))
        },
    )
}

fn main() -> Result<(), OrmError> {
    for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::SqlServer] {
        let compiled = active_users(dialect)?;
        println!("[{dialect}] template: {}", compiled.template_sql());

        let query = compiled.invoke((3, vec!["Rosen".to_string(), "Ng".to_string()]))?;
        println!("[{dialect}] bound:    {}", query.statement()?);
    }

    if let Ok(url) = std::env::var("PINGORM_DATABASE_URL") {
        let executor = MayPostgresExecutor::new(pingorm::connect(&url)?);
        let compiled = active_users(Dialect::Postgres)?;
        let users = compiled
            .invoke((1, vec!["Rosen".to_string()]))?
            .to_list(&executor)?;
        for user in users {
            println!("{} {} ({} logins)", user.first_name, user.last_name, user.num_logins);
        }
    }
    Ok(())
}
