//! SQL generation across dialects
//!
//! These tests only render statements; no database is required.

use pingorm::{arg, list, DataEntity, Dialect, Expr, Field, OrmError, QueryBuilder, Value};

#[derive(Debug, Default, Clone, PartialEq, DataEntity)]
#[table_name = "products"]
pub struct Product {
    #[primary_key]
    pub id: i64,
    pub sku: String,
    pub name: Option<String>,
    pub stock: i32,
}

fn products(dialect: Dialect) -> QueryBuilder<Product> {
    QueryBuilder::with_dialect(dialect).unwrap()
}

#[test]
fn test_select_quotes_per_dialect() {
    let query = products(Dialect::Postgres)
        .filter(Product::STOCK.gt(0))
        .unwrap();
    assert_eq!(
        query.to_sql(),
        "SELECT \"id\",\"sku\",\"name\",\"stock\" FROM \"products\" WHERE (\"stock\" > :c0)"
    );

    let query = products(Dialect::MySql).filter(Product::STOCK.gt(0)).unwrap();
    assert_eq!(
        query.to_sql(),
        "SELECT `id`,`sku`,`name`,`stock` FROM `products` WHERE (`stock` > @c0)"
    );

    let query = products(Dialect::SqlServer)
        .filter(Product::STOCK.gt(0))
        .unwrap();
    assert_eq!(
        query.to_sql(),
        "SELECT [id],[sku],[name],[stock] FROM [products] WHERE ([stock] > @c0)"
    );
}

#[test]
fn test_each_comparison_binds_one_parameter() {
    let cases: Vec<(Expr<Product, bool>, &str)> = vec![
        (Product::STOCK.eq(5), "="),
        (Product::STOCK.ne(5), "<>"),
        (Product::STOCK.lt(5), "<"),
        (Product::STOCK.le(5), "<="),
        (Product::STOCK.gt(5), ">"),
        (Product::STOCK.ge(5), ">="),
    ];
    for (predicate, op) in cases {
        let query = products(Dialect::Postgres).filter(predicate).unwrap();
        assert_eq!(query.where_clause(), format!("(\"stock\" {op} :c0)"));
        let statement = query.statement().unwrap();
        assert_eq!(statement.parameters.len(), 1, "operator {op}");
        assert_eq!(statement.parameters[0].value, Value::Int(Some(5)));
    }
}

#[test]
fn test_multiply_binds_one_parameter() {
    let query = products(Dialect::Postgres)
        .filter(Product::STOCK.lt(Product::STOCK * 3))
        .unwrap();
    assert_eq!(query.where_clause(), "(\"stock\" < (\"stock\" * :c0))");
    assert_eq!(query.statement().unwrap().parameters.len(), 1);

    let query = products(Dialect::MySql)
        .update(Product::STOCK, Product::STOCK * 2)
        .unwrap();
    assert_eq!(query.to_sql(), "UPDATE `products` SET `stock` = (`stock` * @c0)");
    let statement = query.statement().unwrap();
    assert_eq!(statement.parameters.len(), 1);
    assert_eq!(statement.parameters[0].value, Value::Int(Some(2)));
}

#[test]
fn test_combined_predicates_keep_grouping() {
    let query = products(Dialect::Postgres)
        .filter(
            Product::STOCK
                .gt(0)
                .and(Product::SKU.starts_with("AB").or(Product::SKU.ends_with("-X"))),
        )
        .unwrap();
    assert_eq!(
        query.where_clause(),
        "((\"stock\" > :c0) AND ((\"sku\" ILIKE :c1) OR (\"sku\" ILIKE :c2)))"
    );
    let statement = query.statement().unwrap();
    assert_eq!(statement.parameter("c1").unwrap().value, Value::from("AB%"));
    assert_eq!(statement.parameter("c2").unwrap().value, Value::from("%-X"));
}

#[test]
fn test_negation_and_membership() {
    let query = products(Dialect::MySql)
        .filter(!Product::ID.is_in(list(vec![4_i64, 8])))
        .unwrap();
    assert_eq!(query.where_clause(), "(NOT (`id` IN (@c0_0, @c0_1)))");
    assert_eq!(query.statement().unwrap().parameters.len(), 2);
}

#[test]
fn test_captured_arguments_use_their_names() {
    let query = products(Dialect::Postgres)
        .filter(Product::SKU.eq(arg("sku", "AB-1".to_string())))
        .unwrap();
    assert_eq!(query.where_clause(), "(\"sku\" = :psku)");
    let statement = query.statement().unwrap();
    assert_eq!(statement.parameters[0].name, "psku");
}

#[test]
fn test_paging_per_dialect() {
    let sql = products(Dialect::Postgres).skip(10).take(5).to_sql();
    assert!(sql.ends_with("FROM \"products\" OFFSET 10 LIMIT 5"));

    let sql = products(Dialect::MySql).skip(10).to_sql();
    assert!(sql.ends_with(&format!("FROM `products` LIMIT {} OFFSET 10", u64::MAX)));

    let sql = products(Dialect::SqlServer)
        .order_by(Product::SKU)
        .unwrap()
        .take(5)
        .to_sql();
    assert!(sql.ends_with("ORDER BY [sku] OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"));
}

#[test]
fn test_update_statement() {
    let query = products(Dialect::SqlServer)
        .update(Product::STOCK, Product::STOCK - 1)
        .unwrap()
        .filter(Product::ID.eq(arg("id", 3_i64)))
        .unwrap();
    assert_eq!(
        query.to_sql(),
        "UPDATE [products] SET [stock] = ([stock] - @c0) WHERE ([id] = @pid)"
    );
}

#[test]
fn test_count_sql() {
    let query = products(Dialect::Postgres)
        .filter(Product::STOCK.le(3))
        .unwrap()
        .take(1);
    assert_eq!(
        query.count_sql(),
        "SELECT COUNT(*) FROM \"products\" WHERE (\"stock\" <= :c0)"
    );
}

#[test]
fn test_unmapped_field_is_rejected() {
    let ghost: Field<Product, i32> = Field::new("ghost");
    let err = products(Dialect::Postgres).filter(ghost.eq(1)).unwrap_err();
    assert!(matches!(err, OrmError::UnmappedProperty { .. }));
}
