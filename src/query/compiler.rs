//! Lowers expression trees to SQL fragments.
//!
//! The compiler walks a [`Node`] recursively, resolving columns through the
//! table descriptor and binding every value into the query's parameter table.
//! Closed subtrees under a conversion, a custom method or a conditional are
//! folded to constants first.

use super::expr::{BinaryOp, Method, Node, UnaryOp};
use super::params::{LikeWrap, ParameterTable};
use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::schema::TableDescriptor;
use crate::value::{as_decimal, as_f64, as_i64, cast_value, is_null, Bound, ValueKind};
use sea_query::Value;
use std::cmp::Ordering;

/// Rendered SQL plus whether it can be embedded without extra parentheses
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    pub sql: String,
    pub enclosed: bool,
}

impl Fragment {
    fn enclosed(sql: String) -> Self {
        Self { sql, enclosed: true }
    }

    fn open(sql: String) -> Self {
        Self { sql, enclosed: false }
    }

    /// SQL wrapped in parentheses unless it already is
    pub fn into_group(self) -> String {
        if self.enclosed {
            self.sql
        } else {
            format!("({})", self.sql)
        }
    }
}

pub(crate) struct Compiler<'a> {
    table: &'a TableDescriptor,
    parameters: &'a mut ParameterTable,
    next_constant: &'a mut usize,
}

impl<'a> Compiler<'a> {
    pub fn new(
        table: &'a TableDescriptor,
        parameters: &'a mut ParameterTable,
        next_constant: &'a mut usize,
    ) -> Self {
        Self {
            table,
            parameters,
            next_constant,
        }
    }

    fn dialect(&self) -> Dialect {
        self.table.dialect
    }

    pub fn compile(&mut self, node: &Node) -> Result<Fragment, OrmError> {
        self.visit(node, None)
    }

    fn visit(&mut self, node: &Node, wrap: Option<LikeWrap>) -> Result<Fragment, OrmError> {
        match node {
            Node::Column { parent, property } => Ok(Fragment::enclosed(
                self.table.quoted_column(*parent, property)?,
            )),
            Node::Constant(bound) => self.bind_constant(bound.clone(), wrap),
            Node::Captured {
                name,
                value,
                placeholder,
            } => self.bind_captured(name, value, *placeholder, wrap),
            Node::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let inner = self.visit(operand, None)?;
                Ok(Fragment::open(format!("NOT {}", inner.into_group())))
            }
            Node::Unary { op, .. } => Err(OrmError::UnsupportedUnaryOperator(op.to_string())),
            Node::Convert { operand, .. } => match operand.as_ref() {
                Node::Column { .. } | Node::Captured { .. } => self.visit(operand, wrap),
                _ => match fold(node)? {
                    Some(bound) => self.bind_constant(bound, wrap),
                    None => Err(OrmError::UnhandledExpression(format!(
                        "Convert({})",
                        operand.kind_name()
                    ))),
                },
            },
            Node::Binary { op, left, right } => {
                let sql_op = op
                    .sql()
                    .ok_or_else(|| OrmError::UnsupportedBinaryOperator(op.to_string()))?;
                let left = self.visit(left, None)?;
                let right = self.visit(right, None)?;
                Ok(Fragment::enclosed(format!(
                    "({} {sql_op} {})",
                    left.into_group(),
                    right.into_group()
                )))
            }
            Node::Call {
                method,
                receiver,
                args,
            } => self.visit_call(node, method, receiver.as_deref(), args),
            Node::Conditional { .. } => {
                Err(OrmError::UnhandledExpression(node.kind_name().to_string()))
            }
        }
    }

    fn visit_call(
        &mut self,
        node: &Node,
        method: &Method,
        receiver: Option<&Node>,
        args: &[Node],
    ) -> Result<Fragment, OrmError> {
        match (method, receiver, args) {
            (Method::Contains, Some(list), [needle]) if list.is_list() => {
                self.membership(needle, list)
            }
            (Method::Contains, None, [list, needle]) if list.is_list() => {
                self.membership(needle, list)
            }
            (Method::Contains, Some(text), [pattern]) => {
                self.like(text, pattern, LikeWrap::Contains)
            }
            (Method::StartsWith, Some(text), [pattern]) => {
                self.like(text, pattern, LikeWrap::StartsWith)
            }
            (Method::EndsWith, Some(text), [pattern]) => {
                self.like(text, pattern, LikeWrap::EndsWith)
            }
            (Method::Custom { name, .. }, ..) => match fold(node)? {
                Some(bound) => self.bind_constant(bound, None),
                None => Err(OrmError::UnsupportedMethod((*name).to_string())),
            },
            (method, ..) => Err(OrmError::UnsupportedMethod(method.name().to_string())),
        }
    }

    fn membership(&mut self, needle: &Node, list: &Node) -> Result<Fragment, OrmError> {
        let needle = self.visit(needle, None)?;
        let list = self.visit(list, None)?;
        Ok(Fragment::enclosed(format!("({} IN {})", needle.sql, list.sql)))
    }

    fn like(&mut self, text: &Node, pattern: &Node, wrap: LikeWrap) -> Result<Fragment, OrmError> {
        let text = self.visit(text, None)?;
        let pattern = self.visit(pattern, Some(wrap))?;
        Ok(Fragment::enclosed(self.dialect().like(&text.sql, &pattern.sql)))
    }

    fn bind(&mut self, name: &str, value: Value, wrap: Option<LikeWrap>) -> Result<String, OrmError> {
        let wrap = wrap.filter(|_| matches!(value, Value::String(_)));
        self.parameters.bind(name, Bound::One(value), wrap)?;
        Ok(self.dialect().token_for(name))
    }

    fn bind_list(&mut self, prefix: &str, values: Vec<Value>) -> Result<Fragment, OrmError> {
        if values.is_empty() {
            return Ok(Fragment::enclosed("(NULL)".to_string()));
        }
        let mut tokens = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            tokens.push(self.bind(&format!("{prefix}{i}"), value, None)?);
        }
        Ok(Fragment::enclosed(format!("({})", tokens.join(", "))))
    }

    fn bind_constant(&mut self, bound: Bound, wrap: Option<LikeWrap>) -> Result<Fragment, OrmError> {
        let index = *self.next_constant;
        *self.next_constant += 1;
        let name = Dialect::parameter_name(&index.to_string(), true);
        match bound {
            Bound::One(value) => Ok(Fragment::enclosed(self.bind(&name, value, wrap)?)),
            Bound::Many(values) => self.bind_list(&format!("{name}_"), values),
        }
    }

    fn bind_captured(
        &mut self,
        name: &str,
        value: &Bound,
        placeholder: bool,
        wrap: Option<LikeWrap>,
    ) -> Result<Fragment, OrmError> {
        let name = Dialect::parameter_name(name, false);
        match value {
            Bound::One(value) => Ok(Fragment::enclosed(self.bind(&name, value.clone(), wrap)?)),
            Bound::Many(_) if placeholder => {
                // expanded into one token per element at invocation
                self.parameters.bind(&name, Bound::Many(Vec::new()), None)?;
                Ok(Fragment::enclosed(format!(
                    "({})",
                    self.dialect().token_for(&name)
                )))
            }
            Bound::Many(values) => self.bind_list(&name, values.clone()),
        }
    }
}

/// Evaluate a closed subtree. `Ok(None)` means the subtree references the
/// entity, a compiled-query placeholder, or cannot be evaluated.
pub(crate) fn fold(node: &Node) -> Result<Option<Bound>, OrmError> {
    match node {
        Node::Constant(bound) => Ok(Some(bound.clone())),
        Node::Captured {
            value,
            placeholder: false,
            ..
        } => Ok(Some(value.clone())),
        Node::Captured { .. } | Node::Column { .. } => Ok(None),
        Node::Convert { operand, kind } => match fold(operand)? {
            Some(Bound::One(value)) => Ok(Some(Bound::One(cast_value(&value, *kind)?))),
            Some(Bound::Many(values)) => values
                .iter()
                .map(|v| cast_value(v, *kind))
                .collect::<Result<Vec<_>, _>>()
                .map(|values| Some(Bound::Many(values))),
            None => Ok(None),
        },
        Node::Unary { op, operand } => match fold(operand)? {
            Some(Bound::One(value)) => Ok(fold_unary(*op, &value).map(Bound::One)),
            _ => Ok(None),
        },
        Node::Binary { op, left, right } => match (fold(left)?, fold(right)?) {
            (Some(Bound::One(left)), Some(Bound::One(right))) => {
                Ok(fold_binary(*op, &left, &right)?.map(Bound::One))
            }
            _ => Ok(None),
        },
        Node::Call {
            method: Method::Custom { eval, .. },
            receiver,
            args,
        } => {
            let mut operands = Vec::with_capacity(args.len() + 1);
            for operand in receiver.as_deref().into_iter().chain(args.iter()) {
                match fold(operand)? {
                    Some(Bound::One(value)) => operands.push(value),
                    _ => return Ok(None),
                }
            }
            Ok(eval(&operands).map(Bound::One))
        }
        Node::Call { .. } => Ok(None),
        Node::Conditional {
            test,
            if_true,
            if_false,
        } => match fold(test)? {
            Some(Bound::One(Value::Bool(Some(true)))) => fold(if_true),
            Some(Bound::One(Value::Bool(Some(false)))) => fold(if_false),
            _ => Ok(None),
        },
    }
}

fn fold_unary(op: UnaryOp, value: &Value) -> Option<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(Some(b))) => Some(Value::Bool(Some(!b))),
        (UnaryOp::Negate, value) => {
            let kind = ValueKind::of(value);
            match kind {
                ValueKind::Int16 | ValueKind::Int32 | ValueKind::Int64 => {
                    let negated = as_i64(value)?.checked_neg()?;
                    cast_value(&Value::BigInt(Some(negated)), kind).ok()
                }
                ValueKind::Double => as_f64(value).map(|v| Value::Double(Some(-v))),
                ValueKind::Decimal => as_decimal(value).map(|v| Value::from(-v)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn integer_rank(kind: ValueKind) -> Option<u8> {
    match kind {
        ValueKind::Int16 => Some(1),
        ValueKind::Int32 => Some(2),
        ValueKind::Int64 => Some(3),
        _ => None,
    }
}

fn fold_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Value>, OrmError> {
    let (lk, rk) = (ValueKind::of(left), ValueKind::of(right));
    if let (Some(lr), Some(rr)) = (integer_rank(lk), integer_rank(rk)) {
        let (Some(l), Some(r)) = (as_i64(left), as_i64(right)) else {
            return Ok(None);
        };
        let result = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Subtract => l.checked_sub(r),
            BinaryOp::Multiply => l.checked_mul(r),
            BinaryOp::Divide => l.checked_div(r),
            BinaryOp::Modulo => l.checked_rem(r),
            _ => None,
        };
        let Some(result) = result else {
            return Ok(None);
        };
        let kind = if lr >= rr { lk } else { rk };
        return cast_value(&Value::BigInt(Some(result)), kind).map(Some);
    }
    if lk == ValueKind::Decimal || rk == ValueKind::Decimal {
        let (Some(l), Some(r)) = (as_decimal(left), as_decimal(right)) else {
            return Ok(None);
        };
        let result = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Subtract => l.checked_sub(r),
            BinaryOp::Multiply => l.checked_mul(r),
            BinaryOp::Divide => l.checked_div(r),
            BinaryOp::Modulo => l.checked_rem(r),
            _ => None,
        };
        return Ok(result.map(Value::from));
    }
    if lk.is_numeric() && rk.is_numeric() {
        let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) else {
            return Ok(None);
        };
        let result = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Subtract => l - r,
            BinaryOp::Multiply => l * r,
            BinaryOp::Divide => l / r,
            BinaryOp::Modulo => l % r,
            _ => return Ok(None),
        };
        return Ok(Some(Value::Double(Some(result))));
    }
    match (op, left, right) {
        (BinaryOp::Add, Value::String(Some(l)), Value::String(Some(r))) => {
            Ok(Some(Value::String(Some(format!("{l}{r}")))))
        }
        _ => Ok(None),
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (as_i64(left), as_i64(right)) {
        return Some(l.cmp(&r));
    }
    let (lk, rk) = (ValueKind::of(left), ValueKind::of(right));
    if lk.is_numeric() && rk.is_numeric() {
        if lk == ValueKind::Decimal || rk == ValueKind::Decimal {
            return Some(as_decimal(left)?.cmp(&as_decimal(right)?));
        }
        return as_f64(left)?.partial_cmp(&as_f64(right)?);
    }
    match (left, right) {
        (Value::String(Some(l)), Value::String(Some(r))) => Some(l.cmp(r)),
        (Value::Bool(Some(l)), Value::Bool(Some(r))) => Some(l.cmp(r)),
        _ if left == right => Some(Ordering::Equal),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Value>, OrmError> {
    let flag = |b: bool| Ok(Some(Value::Bool(Some(b))));
    match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(Some(l)), Value::Bool(Some(r))) => {
                flag(if op == BinaryOp::And { *l && *r } else { *l || *r })
            }
            _ => Ok(None),
        },
        BinaryOp::Coalesce => Ok(Some(if is_null(left) {
            right.clone()
        } else {
            left.clone()
        })),
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let equal = compare_values(left, right) == Some(Ordering::Equal);
            flag(if op == BinaryOp::Equal { equal } else { !equal })
        }
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => match compare_values(left, right) {
            Some(ordering) => flag(match op {
                BinaryOp::LessThan => ordering == Ordering::Less,
                BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
                BinaryOp::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }),
            None => Ok(None),
        },
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => fold_arithmetic(op, left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, EntitySchema};
    use std::sync::Arc;

    fn table(dialect: Dialect) -> TableDescriptor {
        let schema = EntitySchema {
            entity: "User",
            key: "tests",
            table: "users",
            sequence: None,
            columns: vec![
                ColumnDescriptor::new("id", "id", ValueKind::Int64).primary_key(),
                ColumnDescriptor::new("last_name", "last_name", ValueKind::String),
                ColumnDescriptor::new("num_logins", "num_logins", ValueKind::Int32),
                ColumnDescriptor::new("city", "home_city", ValueKind::String).nested_in("address"),
            ],
        };
        TableDescriptor::build(schema, dialect).unwrap()
    }

    fn column(property: &'static str) -> Node {
        Node::Column {
            parent: None,
            property,
        }
    }

    fn constant(value: Value) -> Node {
        Node::Constant(Bound::One(value))
    }

    fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn compile(dialect: Dialect, node: &Node) -> Result<(String, ParameterTable), OrmError> {
        let table = table(dialect);
        let mut parameters = ParameterTable::new();
        let mut next = 0;
        let fragment = Compiler::new(&table, &mut parameters, &mut next).compile(node)?;
        Ok((fragment.sql, parameters))
    }

    #[test]
    fn test_comparison_binds_constant() {
        let node = binary(BinaryOp::Equal, column("id"), constant(Value::BigInt(Some(7))));
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "(\"id\" = :c0)");
        assert_eq!(params.get("c0").unwrap().value, Bound::One(Value::BigInt(Some(7))));
    }

    #[test]
    fn test_nested_column_resolves_through_parent() {
        let node = binary(
            BinaryOp::Equal,
            Node::Column {
                parent: Some("address"),
                property: "city",
            },
            constant(Value::String(Some("Oslo".to_string()))),
        );
        let (sql, _) = compile(Dialect::SqlServer, &node).unwrap();
        assert_eq!(sql, "([home_city] = @c0)");
    }

    #[test]
    fn test_not_wraps_operand() {
        let node = Node::Unary {
            op: UnaryOp::Not,
            operand: Box::new(binary(
                BinaryOp::GreaterThan,
                column("num_logins"),
                constant(Value::Int(Some(3))),
            )),
        };
        let (sql, _) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "NOT (\"num_logins\" > :c0)");
    }

    #[test]
    fn test_negated_operand_is_grouped() {
        let negated = Node::Unary {
            op: UnaryOp::Not,
            operand: Box::new(binary(
                BinaryOp::GreaterThan,
                column("num_logins"),
                constant(Value::Int(Some(3))),
            )),
        };
        let node = binary(BinaryOp::Equal, negated, constant(Value::Bool(Some(true))));
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "((NOT (\"num_logins\" > :c0)) = :c1)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_string_methods_use_like_with_wrapped_parameter() {
        let node = Node::Call {
            method: Method::Contains,
            receiver: Some(Box::new(column("last_name"))),
            args: vec![constant(Value::String(Some("ose".to_string())))],
        };
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "(\"last_name\" ILIKE :c0)");
        let param = params.get("c0").unwrap();
        assert_eq!(param.wrap, Some(LikeWrap::Contains));
        assert_eq!(
            param.bound_value().unwrap(),
            Value::String(Some("%ose%".to_string()))
        );

        let node = Node::Call {
            method: Method::StartsWith,
            receiver: Some(Box::new(column("last_name"))),
            args: vec![constant(Value::String(Some("Ro".to_string())))],
        };
        let (sql, _) = compile(Dialect::MySql, &node).unwrap();
        assert_eq!(sql, "(LOWER(`last_name`) LIKE LOWER(@c0))");
    }

    #[test]
    fn test_membership_expands_list() {
        let node = Node::Call {
            method: Method::Contains,
            receiver: Some(Box::new(Node::Captured {
                name: "ids".to_string(),
                value: Bound::Many(vec![Value::BigInt(Some(1)), Value::BigInt(Some(2))]),
                placeholder: false,
            })),
            args: vec![column("id")],
        };
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "(\"id\" IN (:pids0, :pids1))");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_empty_list_renders_null() {
        let node = Node::Call {
            method: Method::Contains,
            receiver: None,
            args: vec![Node::Constant(Bound::Many(Vec::new())), column("id")],
        };
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "(\"id\" IN (NULL))");
        assert!(params.is_empty());
    }

    #[test]
    fn test_unsupported_operators_are_named() {
        let node = binary(BinaryOp::Divide, column("num_logins"), constant(Value::Int(Some(2))));
        let err = compile(Dialect::Postgres, &node).unwrap_err();
        assert_eq!(err.to_string(), "The binary operator 'Divide' is not supported");

        let node = Node::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(column("num_logins")),
        };
        assert!(matches!(
            compile(Dialect::Postgres, &node),
            Err(OrmError::UnsupportedUnaryOperator(_))
        ));

        let node = Node::Conditional {
            test: Box::new(constant(Value::Bool(Some(true)))),
            if_true: Box::new(column("id")),
            if_false: Box::new(column("id")),
        };
        assert!(matches!(
            compile(Dialect::Postgres, &node),
            Err(OrmError::UnhandledExpression(_))
        ));
    }

    #[test]
    fn test_unmapped_property_fails() {
        let node = binary(BinaryOp::Equal, column("nickname"), constant(Value::Int(Some(1))));
        assert!(matches!(
            compile(Dialect::Postgres, &node),
            Err(OrmError::UnmappedProperty { .. })
        ));
    }

    #[test]
    fn test_convert_folds_closed_subtree() {
        let node = binary(
            BinaryOp::Equal,
            column("id"),
            Node::Convert {
                operand: Box::new(binary(
                    BinaryOp::Add,
                    constant(Value::Int(Some(40))),
                    constant(Value::Int(Some(2))),
                )),
                kind: ValueKind::Int64,
            },
        );
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "(\"id\" = :c0)");
        assert_eq!(params.get("c0").unwrap().value, Bound::One(Value::BigInt(Some(42))));

        let column_convert = Node::Convert {
            operand: Box::new(column("num_logins")),
            kind: ValueKind::Int64,
        };
        let (sql, _) = compile(Dialect::Postgres, &column_convert).unwrap();
        assert_eq!(sql, "\"num_logins\"");
    }

    #[test]
    fn test_custom_method_folds_or_fails() {
        let upper: crate::query::expr::Evaluator = Arc::new(|values: &[Value]| match values {
            [Value::String(Some(s))] => Some(Value::String(Some(s.to_uppercase()))),
            _ => None,
        });
        let folded = binary(
            BinaryOp::Equal,
            column("last_name"),
            Node::Call {
                method: Method::Custom {
                    name: "ToUpper",
                    eval: upper.clone(),
                },
                receiver: None,
                args: vec![constant(Value::String(Some("rosen".to_string())))],
            },
        );
        let (_, params) = compile(Dialect::Postgres, &folded).unwrap();
        assert_eq!(
            params.get("c0").unwrap().value,
            Bound::One(Value::String(Some("ROSEN".to_string())))
        );

        let open = Node::Call {
            method: Method::Custom {
                name: "ToUpper",
                eval: upper,
            },
            receiver: None,
            args: vec![column("last_name")],
        };
        let err = compile(Dialect::Postgres, &open).unwrap_err();
        assert!(matches!(err, OrmError::UnsupportedMethod(ref m) if m == "ToUpper"));
    }

    #[test]
    fn test_same_capture_shares_slot() {
        let captured = || Node::Captured {
            name: "id".to_string(),
            value: Bound::One(Value::BigInt(Some(5))),
            placeholder: false,
        };
        let node = binary(
            BinaryOp::Or,
            binary(BinaryOp::Equal, column("id"), captured()),
            binary(BinaryOp::GreaterThan, column("id"), captured()),
        );
        let (sql, params) = compile(Dialect::Postgres, &node).unwrap();
        assert_eq!(sql, "((\"id\" = :pid) OR (\"id\" > :pid))");
        assert_eq!(params.len(), 1);
    }
}
