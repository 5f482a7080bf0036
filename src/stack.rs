//! Native stack growth for the interpreter's recursive walks.
//!
//! Evaluation and expression formatting recurse once per nesting level.
//! Each level goes through [`ensure_sufficient_stack`], which switches to a
//! fresh heap-allocated segment when the current one runs low, so nesting up
//! to [`crate::MAX_EVAL_DEPTH`] never overflows the thread's own stack.
//! Dropping and comparing trees is iterative and needs no guard.

/// Remaining stack below which a new segment is allocated
#[cfg(not(target_arch = "wasm32"))]
const LOW_WATER_MARK: usize = 128 * 1024;

/// Size of each newly allocated segment
#[cfg(not(target_arch = "wasm32"))]
const SEGMENT_SIZE: usize = 2 * 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(LOW_WATER_MARK, SEGMENT_SIZE, f)
}

/// stacker has no wasm backend; the runtime sizes the stack there.
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use crate::ast::{Value, sym};
    use crate::evaluator::{Environment, make_global_environment, run};
    use crate::scheme::{parse, tokenize};
    use crate::{Error, MAX_EVAL_DEPTH};

    fn nested(open: &str, leaf: &str, depth: usize) -> String {
        format!("{}{leaf}{}", open.repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_deep_closure_calls_below_limit() {
        let env = make_global_environment();
        run("(define (inc x) (+ x 1))", &env).unwrap();

        let depth = MAX_EVAL_DEPTH - 2_000;
        let source = nested("(inc ", "0", depth);
        assert_eq!(run(&source, &env).unwrap(), Some(Value::from(depth as u32)));
    }

    #[test]
    fn test_deep_closure_calls_hit_limit() {
        let env = make_global_environment();
        run("(define (inc x) (+ x 1))", &env).unwrap();

        let source = nested("(inc ", "0", MAX_EVAL_DEPTH * 2);
        assert_eq!(
            run(&source, &env).unwrap_err(),
            Error::RecursionLimit {
                limit: MAX_EVAL_DEPTH
            }
        );
    }

    #[test]
    fn test_deep_lambda_nesting() {
        // Each lambda body closes over the previous call frame
        let depth = 5_000;
        let source = format!(
            "{}{}{}",
            "((lambda (x) ".repeat(depth),
            "x",
            ") 7)".repeat(depth)
        );
        let env = make_global_environment();
        assert_eq!(run(&source, &env).unwrap(), Some(Value::from(7)));
    }

    #[test]
    fn test_deep_tree_format() {
        let source = nested("(", "leaf", 50_000);
        let expression = parse(&tokenize(&source)).unwrap();
        assert_eq!(expression.to_string(), source);

        let debug = format!("{expression:?}");
        assert!(debug.starts_with("Combination([Combination(["));
        assert!(debug.contains(&format!("{:?}", sym("leaf"))));
    }

    #[test]
    fn test_deep_tree_drop() {
        let source = nested("(", "leaf", 500_000);
        drop(parse(&tokenize(&source)).unwrap());

        // An uncalled closure body shares the parsed tree
        let env = make_global_environment();
        let closure = run(&format!("(lambda () {source})"), &env).unwrap();
        assert!(matches!(closure, Some(Value::Closure { .. })));
        drop(closure);
    }

    #[test]
    fn test_long_frame_chain_drop() {
        let root = make_global_environment();
        let mut innermost = Environment::with_parent(&root);
        for i in 0..200_000u32 {
            innermost.define("i", Value::from(i));
            innermost = Environment::with_parent(&innermost);
        }
        assert_eq!(innermost.lookup("i").unwrap(), Value::from(199_999));
        assert!(innermost.get("+").unwrap().is_procedure());
        assert_eq!(innermost.get_all_bindings().len(), 5);
        drop(innermost);

        assert!(root.get("i").is_none());
    }
}
