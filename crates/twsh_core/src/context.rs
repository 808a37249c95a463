//! Process-wide execution state.
//!
//! Exactly one `ExecutionContext` exists per shell process. Every component
//! reads and writes shell-wide state through it — nothing keeps a private
//! copy — and it is only ever mutated from the single shell thread.

use crate::job::JobTable;
use crate::scope::ScopeManager;
use crate::trap::TrapTable;
use crate::error::{ShellError, ShellResult};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use twsh_hal::{process, Pid};
use twsh_parser::ast::AstNode;

/// Toggleable shell options (`set -e`, `set -o pipefail`, …).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellOptions {
    pub errexit: bool,
    pub nounset: bool,
    pub xtrace: bool,
    pub pipefail: bool,
    pub noclobber: bool,
    /// Job control (terminal ownership transfer) enabled.
    pub monitor: bool,
}

impl ShellOptions {
    /// Apply a single-letter flag as `set -e` / `set +e` do.
    pub fn set_flag(&mut self, flag: char, on: bool) -> ShellResult<()> {
        match flag {
            'e' => self.errexit = on,
            'u' => self.nounset = on,
            'x' => self.xtrace = on,
            'C' => self.noclobber = on,
            'm' => self.monitor = on,
            other => {
                return Err(ShellError::usage(format!("set: -{other}: invalid option")))
            }
        }
        Ok(())
    }

    /// Apply a long option as `set -o name` / `set +o name` do.
    pub fn set_named(&mut self, name: &str, on: bool) -> ShellResult<()> {
        match name {
            "errexit" => self.errexit = on,
            "nounset" => self.nounset = on,
            "xtrace" => self.xtrace = on,
            "pipefail" => self.pipefail = on,
            "noclobber" => self.noclobber = on,
            "monitor" => self.monitor = on,
            other => {
                return Err(ShellError::usage(format!("set: {other}: invalid option name")))
            }
        }
        Ok(())
    }

    /// `set -o` listing.
    pub fn listing(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("errexit", self.errexit),
            ("monitor", self.monitor),
            ("noclobber", self.noclobber),
            ("nounset", self.nounset),
            ("pipefail", self.pipefail),
            ("xtrace", self.xtrace),
        ]
    }
}

/// The shell's entire mutable state, created at startup and torn down at
/// exit.
#[derive(Debug)]
pub struct ExecutionContext {
    /// `$?` — always within 0..=255.
    pub last_status: i32,
    /// `$!` — pid of the most recent background job, if any.
    pub last_bg_pid: Option<Pid>,
    /// `$0`.
    pub shell_name: String,
    /// `$1`… — replaced wholesale around function calls.
    pub positional: Vec<String>,
    pub options: ShellOptions,
    pub scopes: ScopeManager,
    pub traps: TrapTable,
    pub jobs: JobTable,
    pub functions: HashMap<String, Rc<AstNode>>,
    /// Names marked for export to child environments.
    pub exported: HashSet<String>,
    pub interactive: bool,
    /// The shell's own process group, owner of the terminal between jobs.
    pub shell_pgid: Pid,
}

impl ExecutionContext {
    pub fn new(interactive: bool) -> Self {
        let mut scopes = ScopeManager::new();
        let mut exported = HashSet::new();
        // The inherited environment seeds the global scope, pre-exported.
        for (name, value) in std::env::vars() {
            scopes.set_variable(&name, &value, false);
            exported.insert(name);
        }

        Self {
            last_status: 0,
            last_bg_pid: None,
            shell_name: "twsh".to_string(),
            positional: Vec::new(),
            options: ShellOptions {
                monitor: interactive,
                ..ShellOptions::default()
            },
            scopes,
            traps: TrapTable::new(),
            jobs: JobTable::new(),
            functions: HashMap::new(),
            exported,
            interactive,
            shell_pgid: process::current_process_group(),
        }
    }

    /// Record `$?`, masked into 0..=255.
    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status & 0xff;
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.scopes.get(name)
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        self.scopes.set_variable(name, value, false);
    }

    pub fn export(&mut self, name: &str) {
        self.exported.insert(name.to_string());
    }

    /// Environment for a child process: every exported name currently
    /// visible in the scope stack.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let visible = self.scopes.visible();
        self.exported
            .iter()
            .filter_map(|name| {
                visible
                    .get(name.as_str())
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect()
    }
}
