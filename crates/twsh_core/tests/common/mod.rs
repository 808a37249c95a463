//! Shared harness for the execution-engine integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use twsh_core::{ExecutionContext, Executor, Outcome};

pub struct TestShell {
    pub ctx: ExecutionContext,
    pub executor: Executor,
}

impl TestShell {
    pub fn new() -> Self {
        Self {
            ctx: ExecutionContext::new(false),
            executor: Executor::new(),
        }
    }

    /// Parse and execute one input, returning the final outcome.
    pub fn run(&mut self, input: &str) -> Outcome {
        let ast = twsh_parser::parse(input)
            .unwrap_or_else(|e| panic!("parse failed for {input:?}: {e}"));
        self.executor.run(&ast, &mut self.ctx)
    }

    /// Execute and return `$?`.
    pub fn status(&mut self, input: &str) -> i32 {
        self.run(input);
        self.ctx.last_status
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.ctx.get_var(name)
    }
}
