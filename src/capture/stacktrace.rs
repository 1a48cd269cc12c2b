//! Stack capture: on an unhandled fault, re-apply the capture transform
//! at every level of the faulting call chain.

use super::{build_replacement, run_buffer, run_trapped, CaptureError, Replacement};
use crate::debugger::program::Program;
use crate::debugger::render::History;
use crate::debugger::session::SessionStore;
use crate::interp::{ChainEntry, Trap};
use crate::parser::parse_snippet;
use tracing::debug;

/// Evaluate a buffer to completion or fault. A clean run yields an empty
/// sequence. A fault yields one replacement per recoverable call level,
/// outermost first; levels without a source body (builtins) are skipped.
pub fn capture_stacktrace(
    program: &Program,
    store: &mut SessionStore,
    history: &mut dyn History,
    text: &str,
) -> Result<Vec<Replacement>, CaptureError> {
    let stmts = parse_snippet(text)
        .map_err(|e| CaptureError::ParseOrStep(format!("could not parse the buffer: {e}")))?;

    let fault = match run_buffer(program, store, &stmts, text, None) {
        Ok(_) => return Ok(Vec::new()),
        Err(fault) => fault,
    };
    let chain: Vec<ChainEntry> = fault.call_chain().cloned().collect();
    debug!(levels = chain.len(), fault = %fault, "capturing faulting call chain");

    let mut replacements = Vec::new();
    for entry in &chain {
        // Deterministic re-run, trapping the same call by its sequence
        // number.
        let captured = match run_trapped(program, store, &stmts, text, Trap::CallSeq(entry.seq)) {
            Ok(captured) => captured,
            Err(_) => {
                debug!(callee = %entry.callee, "skipping unrecoverable level");
                continue;
            }
        };
        match build_replacement(program, store, history, captured) {
            Ok(replacement) => replacements.push(replacement),
            Err(CaptureError::DefMissing(callee)) => {
                debug!(%callee, "skipping level without source");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(replacements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::eval_buffer;
    use crate::debugger::render::VecHistory;
    use crate::interp::Value;

    fn stacktrace(
        program_src: &str,
        buffer: &str,
    ) -> (SessionStore, Result<Vec<Replacement>, CaptureError>) {
        let program = Program::load(program_src).expect("program should load");
        let mut store = SessionStore::default();
        let mut history = VecHistory::default();
        let result = capture_stacktrace(&program, &mut store, &mut history, buffer);
        (store, result)
    }

    #[test]
    fn test_clean_run_yields_empty_sequence() {
        let (store, result) = stacktrace("fn f(x) {\n    x\n}", "f(1)");
        assert_eq!(result.expect("clean run"), Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_faulting_chain_yields_outermost_first() {
        let src = "fn outer(x) {\n    inner(x + 1)\n}\nfn inner(y) {\n    y / 0\n}";
        let (store, result) = stacktrace(src, "outer(3)");
        let replacements = result.expect("capture succeeds");
        let callees: Vec<_> = replacements.iter().map(|r| r.callee.as_str()).collect();
        assert_eq!(callees, vec!["outer", "inner"]);

        let outer = store.lookup(&replacements[0].stash_id).expect("stored");
        assert_eq!(outer.bindings, vec![("x".to_string(), Value::Int(3))]);
        let inner = store.lookup(&replacements[1].stash_id).expect("stored");
        assert_eq!(inner.bindings, vec![("y".to_string(), Value::Int(4))]);
    }

    #[test]
    fn test_each_level_round_trips_independently() {
        let src = "fn outer(x) {\n    inner(x) + 1\n}\nfn inner(y) {\n    fail(str(y))\n}";
        let program = Program::load(src).expect("load");
        let mut store = SessionStore::default();
        let mut history = VecHistory::default();
        let replacements = capture_stacktrace(&program, &mut store, &mut history, "outer(7)")
            .expect("capture succeeds");
        // `fail` has no source, so exactly the two user levels survive.
        assert_eq!(replacements.len(), 2);

        // Re-evaluating the outer replacement reproduces the fault.
        let outer = eval_buffer(&program, &store, &replacements[0].text);
        assert!(matches!(outer, Err(CaptureError::Eval { .. })));
        // Its bindings are intact for inspection.
        let set = store.lookup(&replacements[0].stash_id).expect("stored");
        assert_eq!(set.get("x"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_builtin_level_is_skipped() {
        let src = "fn f(s) {\n    len(s)\n}";
        let (_, result) = stacktrace(src, "f(1)");
        let replacements = result.expect("capture succeeds");
        let callees: Vec<_> = replacements.iter().map(|r| r.callee.as_str()).collect();
        assert_eq!(callees, vec!["f"], "the builtin level has no source");
    }

    #[test]
    fn test_top_level_fault_with_no_calls_yields_empty() {
        let (_, result) = stacktrace("", "1 / 0");
        assert_eq!(result.expect("no call levels"), Vec::new());
    }
}
