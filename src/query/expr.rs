//! Expression tree and its typed front-end.
//!
//! Predicates and update values are built from [`Field`]s, literals and
//! captured [`Arg`]s. Every value is captured when the expression is built;
//! the compiler never has to evaluate user code to find a parameter value.
//!
//! ```
//! use pingorm::query::{list, Expr};
//! use pingorm::{DataEntity, Entity};
//!
//! #[derive(Debug, Default, Clone, DataEntity)]
//! #[table_name = "users"]
//! pub struct User {
//!     #[primary_key]
//!     pub id: i64,
//!     pub last_name: String,
//!     pub num_logins: i32,
//! }
//!
//! let active: Expr<User, bool> = User::NUM_LOGINS.gt(3) & User::LAST_NAME.starts_with("Ro");
//! let picked: Expr<User, bool> = list(vec![1_i64, 2, 3]).contains(User::ID);
//! # let _ = (active, picked);
//! ```

use crate::value::{Bound, ColumnValue, ValueKind};
use sea_query::Value;
use std::fmt;
use std::marker::PhantomData;
use std::ops;
use std::sync::Arc;

/// Evaluator for a custom method over already-folded operand values
pub type Evaluator = Arc<dyn Fn(&[Value]) -> Option<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Coalesce,
}

impl BinaryOp {
    /// SQL operator, `None` for operators that have no lowering
    pub fn sql(self) -> Option<&'static str> {
        match self {
            BinaryOp::And => Some("AND"),
            BinaryOp::Or => Some("OR"),
            BinaryOp::Equal => Some("="),
            BinaryOp::NotEqual => Some("<>"),
            BinaryOp::LessThan => Some("<"),
            BinaryOp::LessThanOrEqual => Some("<="),
            BinaryOp::GreaterThan => Some(">"),
            BinaryOp::GreaterThanOrEqual => Some(">="),
            BinaryOp::Add => Some("+"),
            BinaryOp::Subtract => Some("-"),
            BinaryOp::Multiply => Some("*"),
            BinaryOp::Divide | BinaryOp::Modulo | BinaryOp::Coalesce => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Method call recognized by the compiler
#[derive(Clone)]
pub enum Method {
    /// String containment or collection membership, depending on the receiver
    Contains,
    StartsWith,
    EndsWith,
    /// Any other method; folded to a constant when all operands are closed
    Custom { name: &'static str, eval: Evaluator },
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Contains => "Contains",
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Untyped expression node
#[derive(Debug, Clone)]
pub enum Node {
    /// Property of the entity parameter, optionally inside a nested group
    Column {
        parent: Option<&'static str>,
        property: &'static str,
    },
    /// Anonymous constant, bound as `c<n>`
    Constant(Bound),
    /// Named captured value, bound as `p<name>`.
    ///
    /// `placeholder` marks a compiled-query argument whose value arrives at
    /// invocation.
    Captured {
        name: String,
        value: Bound,
        placeholder: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    /// Type conversion
    Convert {
        operand: Box<Node>,
        kind: ValueKind,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        method: Method,
        receiver: Option<Box<Node>>,
        args: Vec<Node>,
    },
    Conditional {
        test: Box<Node>,
        if_true: Box<Node>,
        if_false: Box<Node>,
    },
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Column { .. } => "Column",
            Node::Constant(_) => "Constant",
            Node::Captured { .. } => "Captured",
            Node::Unary { .. } => "Unary",
            Node::Convert { .. } => "Convert",
            Node::Binary { .. } => "Binary",
            Node::Call { .. } => "Call",
            Node::Conditional { .. } => "Conditional",
        }
    }

    /// Whether the node is an inline value list or a list argument
    pub fn is_list(&self) -> bool {
        match self {
            Node::Constant(bound) | Node::Captured { value: bound, .. } => bound.is_list(),
            _ => false,
        }
    }

    fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn call(method: Method, receiver: Node, args: Vec<Node>) -> Node {
        Node::Call {
            method,
            receiver: Some(Box::new(receiver)),
            args,
        }
    }
}

/// Typed expression over entity `E` producing a `V`
pub struct Expr<E, V> {
    node: Node,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Clone for Expr<E, V> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<E, V> fmt::Debug for Expr<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

impl<E, V> Expr<E, V> {
    /// Wrap an untyped node; the caller vouches for its type
    pub fn from_node(node: Node) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    fn compare(self, op: BinaryOp, rhs: Expr<E, V>) -> Expr<E, bool> {
        Expr::from_node(Node::binary(op, self.node, rhs.node))
    }

    fn arithmetic(self, op: BinaryOp, rhs: Expr<E, V>) -> Expr<E, V> {
        Expr::from_node(Node::binary(op, self.node, rhs.node))
    }

    pub fn eq(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::Equal, rhs.into())
    }

    pub fn ne(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::NotEqual, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::LessThan, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::LessThanOrEqual, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::GreaterThan, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.compare(BinaryOp::GreaterThanOrEqual, rhs.into())
    }

    /// `self IN list`
    pub fn is_in(self, list: impl Into<List<V>>) -> Expr<E, bool> {
        Expr::from_node(Node::call(Method::Contains, list.into().node, vec![self.node]))
    }

    /// SQL conversion to `W`; only column and argument operands survive into SQL
    pub fn cast<W: ColumnValue>(self) -> Expr<E, W> {
        Expr::from_node(Node::Convert {
            operand: Box::new(self.node),
            kind: W::KIND,
        })
    }

    /// `COALESCE`, which has no lowering and is rejected at compile time
    pub fn coalesce(self, fallback: impl Into<Expr<E, V>>) -> Expr<E, V> {
        self.arithmetic(BinaryOp::Coalesce, fallback.into())
    }

    /// Custom method over `args`. It is folded to a constant when every
    /// argument is closed; otherwise compilation fails.
    pub fn method(
        name: &'static str,
        args: Vec<Node>,
        eval: impl Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::from_node(Node::Call {
            method: Method::Custom {
                name,
                eval: Arc::new(eval),
            },
            receiver: None,
            args,
        })
    }
}

impl<E> Expr<E, bool> {
    pub fn and(self, rhs: Expr<E, bool>) -> Expr<E, bool> {
        self.compare(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expr<E, bool>) -> Expr<E, bool> {
        self.compare(BinaryOp::Or, rhs)
    }

    /// `test ? if_true : if_false`. Conditionals are not lowered to SQL.
    pub fn select<V>(self, if_true: Expr<E, V>, if_false: Expr<E, V>) -> Expr<E, V> {
        Expr::from_node(Node::Conditional {
            test: Box::new(self.node),
            if_true: Box::new(if_true.node),
            if_false: Box::new(if_false.node),
        })
    }
}

impl<E> Expr<E, String> {
    pub fn contains(self, needle: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        Expr::from_node(Node::call(Method::Contains, self.node, vec![needle.into().node]))
    }

    pub fn starts_with(self, prefix: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        Expr::from_node(Node::call(Method::StartsWith, self.node, vec![prefix.into().node]))
    }

    pub fn ends_with(self, suffix: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        Expr::from_node(Node::call(Method::EndsWith, self.node, vec![suffix.into().node]))
    }
}

impl<E> ops::Not for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn not(self) -> Self::Output {
        Expr::from_node(Node::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self.node),
        })
    }
}

impl<E> ops::BitAnd for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<E> ops::BitOr for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<E, V> ops::Neg for Expr<E, V> {
    type Output = Expr<E, V>;

    fn neg(self) -> Self::Output {
        Expr::from_node(Node::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self.node),
        })
    }
}

macro_rules! arithmetic_ops {
    ($target:ident, $($trait:ident :: $method:ident => $op:ident),+ $(,)?) => {
        $(
            impl<E, V, R: Into<Expr<E, V>>> ops::$trait<R> for $target<E, V> {
                type Output = Expr<E, V>;

                fn $method(self, rhs: R) -> Self::Output {
                    Expr::<E, V>::from(self).arithmetic(BinaryOp::$op, rhs.into())
                }
            }
        )+
    };
}

arithmetic_ops!(Expr, Add::add => Add, Sub::sub => Subtract, Mul::mul => Multiply, Div::div => Divide, Rem::rem => Modulo);
arithmetic_ops!(Field, Add::add => Add, Sub::sub => Subtract, Mul::mul => Multiply, Div::div => Divide, Rem::rem => Modulo);

/// A mapped property of entity `E` holding a `V`.
///
/// `#[derive(DataEntity)]` emits one associated constant per field, named
/// after the field in upper case (`User::NUM_LOGINS`).
pub struct Field<E, V> {
    parent: Option<&'static str>,
    property: &'static str,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Clone for Field<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for Field<E, V> {}

impl<E, V> fmt::Debug for Field<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "Field({parent}.{})", self.property),
            None => write!(f, "Field({})", self.property),
        }
    }
}

impl<E, V> Field<E, V> {
    pub const fn new(property: &'static str) -> Self {
        Self {
            parent: None,
            property,
            _marker: PhantomData,
        }
    }

    /// Property of a nested column group
    pub const fn nested(parent: &'static str, property: &'static str) -> Self {
        Self {
            parent: Some(parent),
            property,
            _marker: PhantomData,
        }
    }

    pub fn parent(&self) -> Option<&'static str> {
        self.parent
    }

    pub fn property(&self) -> &'static str {
        self.property
    }

    pub fn node(&self) -> Node {
        Node::Column {
            parent: self.parent,
            property: self.property,
        }
    }

    pub fn expr(self) -> Expr<E, V> {
        Expr::from(self)
    }

    pub fn eq(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().eq(rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().ne(rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().lt(rhs)
    }

    pub fn le(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().le(rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().gt(rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        self.expr().ge(rhs)
    }

    pub fn is_in(self, list: impl Into<List<V>>) -> Expr<E, bool> {
        self.expr().is_in(list)
    }

    pub fn cast<W: ColumnValue>(self) -> Expr<E, W> {
        self.expr().cast()
    }
}

impl<E> Field<E, String> {
    pub fn contains(self, needle: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        self.expr().contains(needle)
    }

    pub fn starts_with(self, prefix: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        self.expr().starts_with(prefix)
    }

    pub fn ends_with(self, suffix: impl Into<Expr<E, String>>) -> Expr<E, bool> {
        self.expr().ends_with(suffix)
    }
}

impl<E> Field<E, bool> {
    /// The boolean column itself as a predicate
    pub fn is_true(self) -> Expr<E, bool> {
        self.expr()
    }
}

/// A named value captured from the caller's scope.
///
/// Named captures bind as `p<name>`; compiled queries use placeholder
/// arguments whose value arrives at invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg<V> {
    name: String,
    value: Option<V>,
}

impl<V> Arg<V> {
    pub fn new(name: impl Into<String>, value: V) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    /// Argument without a value yet
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }
}

/// Shorthand for [`Arg::new`]
pub fn arg<V>(name: impl Into<String>, value: V) -> Arg<V> {
    Arg::new(name, value)
}

/// Anonymous constant
pub fn lit<E, V: ColumnValue>(value: V) -> Expr<E, V> {
    Expr::from(value)
}

impl<E, V: ColumnValue> From<V> for Expr<E, V> {
    fn from(value: V) -> Self {
        Expr::from_node(Node::Constant(Bound::One(value.to_value())))
    }
}

impl<E> From<&str> for Expr<E, String> {
    fn from(value: &str) -> Self {
        Expr::from_node(Node::Constant(Bound::One(Value::String(Some(value.to_string())))))
    }
}

impl<E, V> From<Field<E, V>> for Expr<E, V> {
    fn from(field: Field<E, V>) -> Self {
        Expr::from_node(field.node())
    }
}

impl<E, V: ColumnValue> From<Arg<V>> for Expr<E, V> {
    fn from(arg: Arg<V>) -> Self {
        let placeholder = arg.value.is_none();
        let value = arg.value.map_or_else(V::null_value, |v| v.to_value());
        Expr::from_node(Node::Captured {
            name: arg.name,
            value: Bound::One(value),
            placeholder,
        })
    }
}

/// A list of values for membership tests
pub struct List<V> {
    node: Node,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for List<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> fmt::Debug for List<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

impl<V> List<V> {
    /// `needle IN self`
    pub fn contains<E>(self, needle: impl Into<Expr<E, V>>) -> Expr<E, bool> {
        Expr::from_node(Node::call(Method::Contains, self.node, vec![needle.into().node]))
    }

    pub fn into_node(self) -> Node {
        self.node
    }
}

/// Inline list of constants
pub fn list<V: ColumnValue>(values: impl IntoIterator<Item = V>) -> List<V> {
    List {
        node: Node::Constant(Bound::Many(values.into_iter().map(|v| v.to_value()).collect())),
        _marker: PhantomData,
    }
}

/// Static membership form: `contains(collection, needle)`
pub fn contains<E, V>(collection: impl Into<List<V>>, needle: impl Into<Expr<E, V>>) -> Expr<E, bool> {
    Expr::from_node(Node::Call {
        method: Method::Contains,
        receiver: None,
        args: vec![collection.into().node, needle.into().node],
    })
}

impl<V: ColumnValue> From<Vec<V>> for List<V> {
    fn from(values: Vec<V>) -> Self {
        list(values)
    }
}

impl<V: ColumnValue + Clone> From<&[V]> for List<V> {
    fn from(values: &[V]) -> Self {
        list(values.iter().cloned())
    }
}

impl<V: ColumnValue> From<Arg<Vec<V>>> for List<V> {
    fn from(arg: Arg<Vec<V>>) -> Self {
        let placeholder = arg.value.is_none();
        let values = arg
            .value
            .map(|values| values.iter().map(ColumnValue::to_value).collect())
            .unwrap_or_default();
        List {
            node: Node::Captured {
                name: arg.name,
                value: Bound::Many(values),
                placeholder,
            },
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;

    const AGE: Field<Person, i32> = Field::new("age");
    const NAME: Field<Person, String> = Field::new("name");

    #[test]
    fn test_comparison_builds_binary_node() {
        let expr = AGE.gt(30);
        match expr.node() {
            Node::Binary { op, left, right } => {
                assert_eq!(*op, BinaryOp::GreaterThan);
                assert!(matches!(**left, Node::Column { property: "age", .. }));
                assert!(matches!(**right, Node::Constant(Bound::One(Value::Int(Some(30))))));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_arg_captures_value_at_construction() {
        let expr = NAME.eq(arg("name", "Rosen".to_string()));
        let Node::Binary { right, .. } = expr.node() else {
            panic!("expected binary");
        };
        match &**right {
            Node::Captured { name, value, placeholder } => {
                assert_eq!(name, "name");
                assert_eq!(*value, Bound::One(Value::String(Some("Rosen".to_string()))));
                assert!(!placeholder);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_is_typed_null() {
        let expr = AGE.eq(Arg::<i32>::placeholder("age"));
        let Node::Binary { right, .. } = expr.into_node() else {
            panic!("expected binary");
        };
        assert!(matches!(
            *right,
            Node::Captured { value: Bound::One(Value::Int(None)), placeholder: true, .. }
        ));
    }

    #[test]
    fn test_membership_forms() {
        let instance = list(vec![1, 2]).contains(AGE);
        assert!(matches!(
            instance.node(),
            Node::Call { method: Method::Contains, receiver: Some(_), .. }
        ));

        let fixed = contains::<Person, i32>(vec![1, 2], AGE);
        let Node::Call { receiver, args, .. } = fixed.node() else {
            panic!("expected call");
        };
        assert!(receiver.is_none());
        assert!(args[0].is_list());
    }

    #[test]
    fn test_operators_compose() {
        let expr = !(AGE.ge(18) & NAME.starts_with("A")) | AGE.eq(AGE + 1);
        assert!(matches!(expr.node(), Node::Binary { op: BinaryOp::Or, .. }));
        assert_eq!(BinaryOp::Divide.sql(), None);
        assert_eq!(BinaryOp::NotEqual.sql(), Some("<>"));
    }
}
