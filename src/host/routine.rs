//! The generator/coroutine contract: a dedicated OS thread per active
//! routine, communicating over two `mpsc` channels. See spec's design
//! note on cyclic control flow — this is the "thread + channel" option.

use super::ast::Stmt;
use super::interp::Interp;
use super::value::{FeatureMask, RuntimeError, Value};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Shared execution-context map: the render-call context plus the engine's
/// default context, readable (and, in principle, writable by embedded
/// scripts) from both the routine thread and its owner.
pub type SharedEnv = Arc<Mutex<HashMap<String, Value>>>;

/// A command sent into a suspended routine to resume it.
pub enum Resume {
    Next,
    Throw(RuntimeError),
}

/// What a routine produced at its current suspension point.
pub enum Produced {
    Yielded(Value),
    Done,
    Error(RuntimeError),
}

/// Handle to a routine running on its own thread.
///
/// `advance` is the single entry point for both `next()` and `throw()`
/// (spec §4.9): it sends a [`Resume`] command and blocks for the routine's
/// next [`Produced`] value, including the very first call, which kicks off
/// execution of an otherwise-idle thread.
#[derive(Debug)]
pub struct RoutineHandle {
    resume_tx: Option<Sender<Resume>>,
    result_rx: Receiver<Produced>,
    thread: Option<JoinHandle<()>>,
}

impl RoutineHandle {
    pub fn start(body: Arc<Vec<Stmt>>, globals: SharedEnv, features: FeatureMask) -> Self {
        let (resume_tx, resume_rx) = mpsc::channel::<Resume>();
        let (result_tx, result_rx) = mpsc::channel::<Produced>();

        let thread = thread::spawn(move || {
            if resume_rx.recv().is_err() {
                return;
            }
            let mut interp = Interp::new(globals, features, result_tx.clone(), resume_rx);
            let outcome = interp.run(&body);
            let final_msg = match outcome {
                Ok(()) => Produced::Done,
                Err(e) => Produced::Error(e),
            };
            let _ = result_tx.send(final_msg);
        });

        RoutineHandle {
            resume_tx: Some(resume_tx),
            result_rx,
            thread: Some(thread),
        }
    }

    pub fn advance(&mut self, cmd: Resume) -> Produced {
        match &self.resume_tx {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    return Produced::Done;
                }
                self.result_rx.recv().unwrap_or(Produced::Done)
            }
            None => Produced::Done,
        }
    }
}

impl Drop for RoutineHandle {
    fn drop(&mut self) {
        // Closing the resume channel unblocks any pending recv in the
        // thread, which then unwinds (running any `finally` blocks along
        // the way) and exits on its own.
        self.resume_tx.take();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::lexer::tokenize;
    use crate::host::parser::parse_program;

    fn compile(src: &str) -> Arc<Vec<Stmt>> {
        Arc::new(parse_program(tokenize(src).unwrap()).unwrap())
    }

    #[test]
    fn empty_program_completes_immediately() {
        let body = compile("pass\n");
        let globals: SharedEnv = Arc::new(Mutex::new(HashMap::new()));
        let mut handle = RoutineHandle::start(body, globals, FeatureMask::NONE);
        assert!(matches!(handle.advance(Resume::Next), Produced::Done));
    }

    #[test]
    fn yields_values_in_order() {
        let body = compile("yield 'a'\nyield 'b'\n");
        let globals: SharedEnv = Arc::new(Mutex::new(HashMap::new()));
        let mut handle = RoutineHandle::start(body, globals, FeatureMask::NONE);
        match handle.advance(Resume::Next) {
            Produced::Yielded(Value::Str(s)) => assert_eq!(s, "a"),
            _ => panic!("expected first yield"),
        }
        match handle.advance(Resume::Next) {
            Produced::Yielded(Value::Str(s)) => assert_eq!(s, "b"),
            _ => panic!("expected second yield"),
        }
        assert!(matches!(handle.advance(Resume::Next), Produced::Done));
    }

    #[test]
    fn throw_is_observable_by_except() {
        let body = compile("try:\n    yield 1\nexcept TypeError:\n    yield 'caught'\n");
        let globals: SharedEnv = Arc::new(Mutex::new(HashMap::new()));
        let mut handle = RoutineHandle::start(body, globals, FeatureMask::NONE);
        match handle.advance(Resume::Next) {
            Produced::Yielded(Value::Int(1)) => {}
            _ => panic!("expected int yield"),
        }
        match handle.advance(Resume::Throw(RuntimeError::type_mismatch("int"))) {
            Produced::Yielded(Value::Str(s)) => assert_eq!(s, "caught"),
            _ => panic!("expected except to catch and yield"),
        }
    }

    #[test]
    fn dropping_handle_unblocks_and_joins_thread() {
        let body = compile("yield 1\nyield 2\n");
        let globals: SharedEnv = Arc::new(Mutex::new(HashMap::new()));
        let mut handle = RoutineHandle::start(body, globals, FeatureMask::NONE);
        let _ = handle.advance(Resume::Next);
        drop(handle);
    }
}
