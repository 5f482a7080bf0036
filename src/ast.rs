//! This module defines the expression tree produced by the parser and the
//! runtime values produced by the evaluator. [`Number`] is shared by both:
//! integers and floats with standard promotion. [`Expression`] is the
//! unevaluated tree (numbers, symbols, combinations) and [`Value`] is the
//! closed set of things an expression can evaluate to: numbers, builtin
//! procedures and closures. Helper functions [`val`], [`sym`] and [`nil`]
//! make building trees in tests concise.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Environment;
use crate::stack::ensure_sufficient_stack;

/// Integer type used by the interpreter
pub(crate) type IntegerType = i64;

/// A numeric literal or result.
///
/// Equality is numeric across variants, so `Integer(2) == Float(2.0)`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(IntegerType),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{n}"),
            // Debug formatting keeps the fractional part: 2.0 rather than 2
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

macro_rules! impl_from_integer {
    ($($int_type:ty),*) => {
        $(
            impl From<$int_type> for Number {
                fn from(n: $int_type) -> Self {
                    Number::Integer(IntegerType::from(n))
                }
            }

            impl From<$int_type> for Expression {
                fn from(n: $int_type) -> Self {
                    Expression::Number(n.into())
                }
            }

            impl From<$int_type> for Value {
                fn from(n: $int_type) -> Self {
                    Value::Number(n.into())
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, IntegerType, u8, u16, u32);

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl From<f64> for Expression {
    fn from(f: f64) -> Self {
        Expression::Number(f.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(f.into())
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

/// Parsed, unevaluated source form.
///
/// Combinations share their elements, so cloning an expression (for example
/// to capture a closure body) is O(1). Dropping, comparing and formatting do
/// not recurse on the native stack, so trees may nest arbitrarily deep.
#[derive(Clone)]
pub enum Expression {
    Number(Number),
    Symbol(String),
    /// A parenthesized form; may be empty
    Combination(Rc<Vec<Expression>>),
}

impl Drop for Expression {
    fn drop(&mut self) {
        let Expression::Combination(elements) = self else {
            return;
        };
        let Some(elements) = Rc::get_mut(elements) else {
            return;
        };

        // Detach uniquely owned children onto a heap worklist so each node
        // is dropped with no children left
        let mut pending = std::mem::take(elements);
        while let Some(mut expr) = pending.pop() {
            if let Expression::Combination(children) = &mut expr
                && let Some(children) = Rc::get_mut(children)
            {
                pending.append(children);
            }
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            match pair {
                (Expression::Number(a), Expression::Number(b)) if a == b => {}
                (Expression::Symbol(a), Expression::Symbol(b)) if a == b => {}
                (Expression::Combination(a), Expression::Combination(b)) if a.len() == b.len() => {
                    if !Rc::ptr_eq(a, b) {
                        pending.extend(a.iter().zip(b.iter()));
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Expression::Symbol(s) => f.debug_tuple("Symbol").field(s).finish(),
            Expression::Combination(elements) => ensure_sufficient_stack(|| {
                f.debug_tuple("Combination").field(&elements.as_slice()).finish()
            }),
        }
    }
}

impl Expression {
    /// The symbol's name, if this is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expression::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl<T: Into<Expression>> From<Vec<T>> for Expression {
    fn from(v: Vec<T>) -> Self {
        Expression::Combination(Rc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Expression>, const N: usize> From<[T; N]> for Expression {
    fn from(arr: [T; N]) -> Self {
        Expression::Combination(Rc::new(arr.into_iter().map(Into::into).collect()))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{n}"),
            Expression::Symbol(s) => write!(f, "{s}"),
            Expression::Combination(elements) => ensure_sufficient_stack(|| {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }),
        }
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Expression {
    Expression::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating expressions from numbers, arrays and vecs
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Expression>>(value: T) -> Expression {
    value.into()
}

/// Helper function for the empty combination `()`
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Expression {
    Expression::Combination(Rc::new(vec![]))
}

/// Canonical signature of a native procedure
pub type OperationFn = dyn Fn(&[Value]) -> Result<Value, Error>;

/// Runtime value
#[derive(Clone)]
pub enum Value {
    Number(Number),
    /// Native procedure; equal only to the same registered instance
    Builtin { id: String, func: Rc<OperationFn> },
    /// User-defined procedure with the environment it was created in
    Closure {
        params: Rc<[String]>,
        body: Rc<Expression>,
        env: Environment,
    },
}

impl Value {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True for builtins and closures
    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Builtin { .. } | Value::Closure { .. })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Builtin { id, .. } => write!(f, "Builtin({id})"),
            // The captured environment may contain this closure; never print it
            Value::Closure { params, body, .. } => {
                write!(f, "Closure(params={params:?}, body={body})")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Builtin { id, .. } => write!(f, "#<builtin:{id}>"),
            Value::Closure { params, .. } => write!(f, "#<closure:({})>", params.join(" ")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Builtin { id: id1, func: f1 }, Value::Builtin { id: id2, func: f2 }) => {
                id1 == id2 && Rc::ptr_eq(f1, f2)
            }
            (
                Value::Closure {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Closure {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && Rc::ptr_eq(b1, b2) && e1 == e2,
            _ => false,
        }
    }
}
