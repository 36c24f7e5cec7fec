//! Entities shared by the unit tests.

use chrono::NaiveDateTime;
use pingorm_derive::{ColumnGroup, DataEntity};

#[derive(Debug, Default, Clone, PartialEq, ColumnGroup)]
pub struct Address {
    #[column_name = "home_city"]
    pub city: Option<String>,
    #[column_name = "home_zip"]
    pub zip: String,
}

#[derive(Debug, Default, Clone, PartialEq, DataEntity)]
#[connection_key = "tests"]
#[table_name = "users"]
#[sequence_name = "seq_users"]
pub struct User {
    #[primary_key]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub num_logins: i32,
    #[nested]
    pub address: Address,
}

/// Partitioned by day
#[derive(Debug, Default, Clone, PartialEq, DataEntity)]
#[connection_key = "tests"]
#[table_name = "events"]
pub struct Event {
    #[primary_key]
    pub id: i64,
    #[partition_key]
    pub occurred_at: NaiveDateTime,
    pub name: String,
}

/// Identity key filled in by the database
#[derive(Debug, Default, Clone, PartialEq, DataEntity)]
#[table_name = "tags"]
pub struct Tag {
    #[primary_key]
    #[auto_increment]
    pub id: i32,
    pub label: String,
}
