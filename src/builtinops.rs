//! Built-in operations registry.
//!
//! The registry is a fixed, immutable table built once per process. It holds
//! two kinds of entries:
//!
//! - **Functions**: receive already-evaluated arguments (`+`, `-`, `*`, `/`)
//! - **Special forms**: receive their operands unevaluated together with the
//!   current environment (`define`, `lambda`)
//!
//! Functions are copied into the root frame by
//! [`crate::evaluator::make_global_environment`]; user code can shadow them
//! but never mutate the table. Special forms are looked up by the evaluator
//! before ordinary application and are never bound in any environment.
//!
//! ## Numeric semantics
//!
//! ```scheme
//! (+)          ; => 0
//! (*)          ; => 1
//! (- 5)        ; => -5
//! (/ 5)        ; => 5
//! (/ 7 2)      ; => 3.5
//! (+ 1 2.5)    ; => 3.5
//! ```
//!
//! Integer arithmetic is checked; overflow and division by zero are
//! evaluation errors. Division with two or more operands always produces a
//! float.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::ast::{Expression, Number, Value};
use crate::evaluator::{Arity, Environment, eval_define, eval_lambda};
use crate::{Error, EvaluationError};

/// Signature of a special form: unevaluated operands, current environment, depth
pub(crate) type SpecialFormFn = fn(&[Expression], &Environment, usize) -> Result<Value, Error>;

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Takes evaluated arguments and returns a value
    Function(fn(&[Value]) -> Result<Value, Error>),
    /// Controls evaluation of its own operands
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Numeric helpers
//

/// Extract every argument as a number, rejecting anything else
fn numeric_args(op: &'static str, args: &[Value]) -> Result<Vec<Number>, Error> {
    args.iter()
        .map(|arg| {
            arg.as_number().ok_or_else(|| {
                EvaluationError::TypeMismatch {
                    op: op.to_owned(),
                    found: arg.to_string(),
                }
                .into()
            })
        })
        .collect()
}

// Integer operands use checked arithmetic; any float operand promotes both
macro_rules! promoting_op {
    ($name:ident, $checked:ident, $op:tt, $what:literal) => {
        fn $name(lhs: Number, rhs: Number) -> Result<Number, Error> {
            match (lhs, rhs) {
                (Number::Integer(a), Number::Integer(b)) => a
                    .$checked(b)
                    .map(Number::Integer)
                    .ok_or_else(|| Error::arithmetic(concat!("integer overflow in ", $what))),
                (a, b) => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

promoting_op!(add, checked_add, +, "addition");
promoting_op!(sub, checked_sub, -, "subtraction");
promoting_op!(mul, checked_mul, *, "multiplication");

fn negate(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_neg()
            .map(Number::Integer)
            .ok_or_else(|| Error::arithmetic("integer overflow in negation")),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn divide(lhs: Number, rhs: Number) -> Result<Number, Error> {
    if rhs.is_zero() {
        return Err(Error::arithmetic("division by zero"));
    }
    Ok(Number::Float(lhs.as_f64() / rhs.as_f64()))
}

fn sum(numbers: &[Number]) -> Result<Number, Error> {
    numbers.iter().try_fold(Number::Integer(0), |acc, &n| add(acc, n))
}

fn product(numbers: &[Number]) -> Result<Number, Error> {
    numbers.iter().try_fold(Number::Integer(1), |acc, &n| mul(acc, n))
}

//
// Builtin Function Implementations
//

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let numbers = numeric_args("+", args)?;
    sum(&numbers).map(Value::Number)
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    match numeric_args("-", args)?.as_slice() {
        [] => Err(Error::arity_error(Arity::AtLeast(1), 0)),
        [only] => negate(*only).map(Value::Number),
        [first, rest @ ..] => sub(*first, sum(rest)?).map(Value::Number),
    }
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let numbers = numeric_args("*", args)?;
    product(&numbers).map(Value::Number)
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    match numeric_args("/", args)?.as_slice() {
        [] => Err(Error::arity_error(Arity::AtLeast(1), 0)),
        [only] => Ok(Value::Number(*only)),
        [first, rest @ ..] => divide(*first, product(rest)?).map(Value::Number),
    }
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::AtLeast(1),
    },
    // Special forms
    BuiltinOp {
        id: "define",
        op_kind: OpKind::SpecialForm(eval_define),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "lambda",
        op_kind: OpKind::SpecialForm(eval_lambda),
        arity: Arity::Exact(2),
    },
];

/// Lazy static map from id to BuiltinOp
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.id, op)).collect());

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation (function or special form) by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(id).copied()
}

/// Find a special form by its identifier
pub(crate) fn find_special_form(id: &str) -> Option<&'static BuiltinOp> {
    find_builtin_op(id).filter(|op| op.is_special_form())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(value.into())
    }

    /// Invoke a builtin function through the registry, validating arity first
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        op.validate_arity(args.len())?;
        match op.op_kind {
            OpKind::Function(func) => func(args),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    fn builtin_value(name: &str) -> Value {
        let env = crate::evaluator::make_global_environment();
        env.get(name).unwrap()
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_builtin_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(!add_op.is_special_form());

        let define_op = find_builtin_op("define").unwrap();
        assert!(define_op.is_special_form());
        assert_eq!(define_op.arity, Arity::Exact(2));

        assert!(find_special_form("lambda").is_some());
        assert!(find_special_form("+").is_none());
        assert!(find_builtin_op("unknown").is_none());

        let ids: Vec<_> = get_builtin_ops().iter().map(|op| op.id).collect();
        assert_eq!(ids, vec!["+", "-", "*", "/", "define", "lambda"]);
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let v = Value::from;
        let f = |x: f64| Value::from(x);
        let many_ones: Vec<Value> = (0..100).map(|_| v(1)).collect();

        let test_cases: Vec<TestCase> = vec![
            // Addition
            test!("+", &[], success(0)),
            test!("+", &[v(5)], success(5)),
            test!("+", &[v(1), v(2), v(3)], success(6)),
            test!("+", &[v(-5), v(10)], success(5)),
            test!("+", &many_ones, success(100)),
            test!("+", &[v(1), f(2.5)], success(3.5)),
            test!("+", &[v(i32::MAX), v(1)], success(2_147_483_648_i64)),
            test!("+", &[Value::from(i64::MAX), v(1)], None),
            // Subtraction
            test!("-", &[v(5)], success(-5)),
            test!("-", &[v(-5)], success(5)),
            test!("-", &[f(2.5)], success(-2.5)),
            test!("-", &[v(10), v(3), v(2)], success(5)),
            test!("-", &[v(0), v(5)], success(-5)),
            test!("-", &[v(10), f(0.5)], success(9.5)),
            test!("-", &[], None),
            test!("-", &[Value::from(i64::MIN)], None),
            // Multiplication
            test!("*", &[], success(1)),
            test!("*", &[v(7)], success(7)),
            test!("*", &[v(2), v(3), v(4)], success(24)),
            test!("*", &[v(-2), v(3)], success(-6)),
            test!("*", &[v(2), f(1.5)], success(3.0)),
            test!("*", &[Value::from(4_611_686_018_427_387_904_i64), v(2)], None),
            // Division
            test!("/", &[v(5)], success(5)),
            test!("/", &[v(6), v(3)], success(2.0)),
            test!("/", &[v(7), v(2)], success(3.5)),
            test!("/", &[v(60), v(2), v(3)], success(10.0)),
            test!("/", &[f(1.0), v(4)], success(0.25)),
            test!("/", &[v(1), v(0)], None),
            test!("/", &[v(1), f(0.0)], None),
            test!("/", &[v(1), v(2), v(0)], None),
            test!("/", &[], None),
            // Non-numeric operands
            test!("+", &[builtin_value("*")], None),
            test!("*", &[v(1), builtin_value("+")], None),
            test!("-", &[builtin_value("-")], None),
            test!("/", &[v(1), builtin_value("/")], None),
        ];

        for (i, (name, result, expected)) in test_cases.into_iter().enumerate() {
            match (result, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name})", i + 1);
                }
                (Err(_), None) => {}
                (Ok(actual), None) => panic!("case #{} ({name}): expected error, got {actual}", i + 1),
                (Err(err), Some(expected)) => {
                    panic!("case #{} ({name}): expected {expected}, got error {err}", i + 1)
                }
            }
        }
    }

    #[test]
    fn test_integer_results_stay_integers() {
        let result = call_builtin("+", &[Value::from(2), Value::from(3)]).unwrap();
        assert!(matches!(result, Value::Number(Number::Integer(5))));

        let result = call_builtin("/", &[Value::from(6), Value::from(3)]).unwrap();
        assert!(matches!(result, Value::Number(Number::Float(_))));

        let result = call_builtin("/", &[Value::from(5)]).unwrap();
        assert!(matches!(result, Value::Number(Number::Integer(5))));
    }

    #[test]
    fn test_builtin_errors_are_evaluation_errors() {
        let err = call_builtin("/", &[Value::from(1), Value::from(0)]).unwrap_err();
        assert_eq!(
            err,
            Error::EvaluationError(EvaluationError::Arithmetic("division by zero".into()))
        );

        let err = call_builtin("-", &[]).unwrap_err();
        assert_eq!(err, Error::arity_error(Arity::AtLeast(1), 0));

        let err = call_builtin("+", &[Value::from(1), builtin_value("+")]).unwrap_err();
        assert!(matches!(
            err,
            Error::EvaluationError(EvaluationError::TypeMismatch { ref op, .. }) if op == "+"
        ));
    }
}
