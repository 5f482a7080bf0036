//! Environments and the evaluation engine.
//!
//! An [`Environment`] is a handle to a shared, mutable frame of bindings with
//! an optional parent. Cloning the handle shares the frame, so a closure and
//! the scope it was created in observe each other's later definitions. Name
//! lookup walks the parent chain; `define` always writes the innermost frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Expression, Value};
use crate::builtinops::{OpKind, find_special_form, get_builtin_ops};
use crate::scheme::{parse_program, tokenize};
use crate::stack::ensure_sufficient_stack;
use crate::{Error, EvaluationError, MAX_EVAL_DEPTH};

/// Number of arguments a procedure or special form accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(self, count: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Unlink uniquely owned ancestors iteratively so long chains cannot
        // exhaust the native stack
        let mut parent = self.parent.take();
        while let Some(Environment(frame)) = parent {
            parent = Rc::try_unwrap(frame)
                .ok()
                .and_then(|cell| cell.into_inner().parent.take());
        }
    }
}

/// Shared handle to a frame of bindings; clones alias the same frame
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// A root frame with no bindings and no parent
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    /// Bind `name` in this frame, replacing any existing binding here.
    /// Bindings of the same name in ancestor frames are shadowed, not touched.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Look `name` up in this frame, then in each ancestor in turn
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.0.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Some(value.clone());
                }
                frame.parent.clone()?
            };
            current = parent;
        }
    }

    /// Like [`Environment::get`], failing with [`Error::NameError`] when unbound
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name).ok_or_else(|| Error::NameError(name.to_owned()))
    }

    /// True if `name` is bound in this frame itself
    pub fn contains_local(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Register a native procedure in this frame.
    ///
    /// The function receives already-evaluated arguments and is responsible
    /// for its own argument checking.
    ///
    /// # Example
    /// ```
    /// use minischeme::evaluator::{make_global_environment, run};
    /// use minischeme::ast::Value;
    /// use minischeme::Error;
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len() as u32))
    /// }
    ///
    /// let env = make_global_environment();
    /// env.register_builtin_function("count-args", count_args);
    /// assert_eq!(run("(count-args 1 2 3)", &env).unwrap(), Some(Value::from(3)));
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        self.define(
            name,
            Value::Builtin {
                id: name.to_owned(),
                func: Rc::new(func),
            },
        );
    }

    /// Get all bindings visible from this environment.
    /// Returns a Vec of (name, value) pairs sorted by name; inner frames win.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(Environment::parent) {
            chain.push(parent);
        }

        // Outermost first so inner frames overwrite
        let mut bindings = HashMap::new();
        for env in chain.iter().rev() {
            for (name, value) in &env.0.borrow().bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&str> = frame.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

/// Evaluate an expression in `env`
pub fn evaluate(expr: &Expression, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an expression with depth tracking to bound runaway recursion
fn eval_with_depth_tracking(expr: &Expression, env: &Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::RecursionLimit {
            limit: MAX_EVAL_DEPTH,
        });
    }

    ensure_sufficient_stack(|| match expr {
        Expression::Number(n) => Ok(Value::Number(*n)),
        Expression::Symbol(name) => env.lookup(name),
        Expression::Combination(elements) => eval_combination(elements, env, depth),
    })
}

/// Helper function to evaluate argument expressions left to right
fn eval_args(args: &[Expression], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a combination: a special form if the head names one, otherwise application
fn eval_combination(elements: &[Expression], env: &Environment, depth: usize) -> Result<Value, Error> {
    if let [Expression::Symbol(name), operands @ ..] = elements
        && let Some(op) = find_special_form(name)
        && let OpKind::SpecialForm(special_form) = op.op_kind
    {
        op.validate_arity(operands.len()).map_err(|_| {
            Error::malformed(
                op.id,
                format!("expected {} operands, got {}", op.arity, operands.len()),
            )
        })?;
        return special_form(operands, env, depth);
    }

    match elements {
        [] => Err(EvaluationError::EmptyCombination.into()),
        [operator_expr, operand_exprs @ ..] => {
            let procedure = eval_with_depth_tracking(operator_expr, env, depth + 1)?;
            let args = eval_args(operand_exprs, env, depth)?;
            apply_with_depth(&procedure, args, depth)
        }
    }
}

/// Apply a procedure value to already-evaluated arguments
pub fn apply(procedure: &Value, args: Vec<Value>) -> Result<Value, Error> {
    apply_with_depth(procedure, args, 0)
}

fn apply_with_depth(procedure: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match procedure {
        Value::Builtin { id, func } => {
            trace!(builtin = %id, argc = args.len(), "apply builtin");
            func(&args)
        }
        Value::Closure {
            params,
            body,
            env: closure_env,
        } => {
            if params.len() != args.len() {
                return Err(Error::arity_error(Arity::Exact(params.len()), args.len()));
            }
            trace!(params = ?params, "apply closure");

            // Fresh frame per call, parented to the defining environment
            let call_env = Environment::with_parent(closure_env);
            for (param, arg) in params.iter().zip(args) {
                call_env.define(param.as_str(), arg);
            }

            eval_with_depth_tracking(body, &call_env, depth + 1)
        }
        other => Err(EvaluationError::NotCallable(other.to_string()).into()),
    }
}

/// Build a closure after checking the parameter list
fn make_closure(
    form: &'static str,
    param_exprs: &[Expression],
    body: &Expression,
    env: &Environment,
) -> Result<Value, Error> {
    let mut params: Vec<String> = Vec::with_capacity(param_exprs.len());
    for param in param_exprs {
        match param {
            Expression::Symbol(name) => {
                if params.contains(name) {
                    return Err(Error::malformed(form, format!("duplicate parameter name: {name}")));
                }
                params.push(name.clone());
            }
            other => {
                return Err(Error::malformed(
                    form,
                    format!("parameters must be symbols, got {other}"),
                ));
            }
        }
    }

    Ok(Value::Closure {
        params: params.into(),
        body: Rc::new(body.clone()),
        env: env.clone(),
    })
}

/// Evaluate define special form: `(define name expr)` or `(define (name params...) body)`
pub(crate) fn eval_define(args: &[Expression], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Expression::Symbol(name), value_expr] => {
            let value = eval_with_depth_tracking(value_expr, env, depth + 1)?;
            debug!(%name, %value, "define");
            env.define(name.as_str(), value.clone());
            Ok(value)
        }
        [Expression::Combination(signature), body] => {
            let [name_expr, param_exprs @ ..] = signature.as_slice() else {
                return Err(Error::malformed("define", "procedure signature needs a name"));
            };
            let Some(name) = name_expr.as_symbol() else {
                return Err(Error::malformed(
                    "define",
                    format!("procedure name must be a symbol, got {name_expr}"),
                ));
            };

            let closure = make_closure("define", param_exprs, body, env)?;
            debug!(%name, params = param_exprs.len(), "define procedure");
            env.define(name, closure.clone());
            Ok(closure)
        }
        [target, _] => Err(Error::malformed(
            "define",
            format!("cannot bind to {target}"),
        )),
        _ => Err(Error::malformed(
            "define",
            format!("expected a name and a value, got {} operands", args.len()),
        )),
    }
}

/// Evaluate lambda special form: `(lambda (params...) body)`
pub(crate) fn eval_lambda(args: &[Expression], env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [Expression::Combination(param_exprs), body] => make_closure("lambda", param_exprs, body, env),
        [params, _] => Err(Error::malformed(
            "lambda",
            format!("parameter list must be parenthesized, got {params}"),
        )),
        _ => Err(Error::malformed(
            "lambda",
            format!("expected a parameter list and a body, got {} operands", args.len()),
        )),
    }
}

/// Create the top-level environment for a program.
///
/// Builtin functions live in a root frame; the returned environment is an
/// empty child of it, so user definitions shadow builtins without touching
/// them.
pub fn make_global_environment() -> Environment {
    let builtins = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            let arity = builtin_op.arity;
            builtins.define(
                builtin_op.id,
                Value::Builtin {
                    id: builtin_op.id.to_owned(),
                    func: Rc::new(move |args: &[Value]| {
                        arity.validate(args.len())?;
                        func(args)
                    }),
                },
            );
        }
    }

    Environment::with_parent(&builtins)
}

/// Tokenize, parse and evaluate every top-level expression of `source` in order.
///
/// Returns the value of the last expression, or `None` for a program with no
/// expressions. Nothing is evaluated if the source fails to parse.
#[tracing::instrument(level = "debug", skip(env))]
pub fn run(source: &str, env: &Environment) -> Result<Option<Value>, Error> {
    let tokens = tokenize(source);
    let program = parse_program(&tokens)?;

    let mut last = None;
    for expr in &program {
        last = Some(evaluate(expr, env)?);
    }
    Ok(last)
}
