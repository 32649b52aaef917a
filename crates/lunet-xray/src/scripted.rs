//! Scripted [`CommandRunner`] for tests.
//!
//! Rules are consulted in insertion order; the first rule returning
//! `Some` answers the call. Unmatched calls fail as unavailable.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::XrayError;
use crate::runner::{CommandRunner, CommandSpec};

type Rule = Box<dyn Fn(&CommandSpec) -> Option<Result<Vec<u8>, XrayError>> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn on<F>(mut self, rule: F) -> Self
    where
        F: Fn(&CommandSpec) -> Option<Result<Vec<u8>, XrayError>> + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
        self
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Calls whose program file name equals `program`.
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program_name() == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError> {
        self.calls.lock().push(spec.clone());
        for rule in &self.rules {
            if let Some(answer) = rule(spec) {
                return answer;
            }
        }
        Err(XrayError::TransportUnavailable(format!(
            "no scripted answer for {spec}"
        )))
    }
}

/// Canned `protoc` rule: answers every `--encode` call with the type name bytes.
pub fn echo_protoc(spec: &CommandSpec) -> Option<Result<Vec<u8>, XrayError>> {
    if spec.program_name() != "protoc" {
        return None;
    }
    let type_name = spec
        .args
        .first()
        .and_then(|a| a.strip_prefix("--encode="))
        .unwrap_or_default();
    Some(Ok(type_name.as_bytes().to_vec()))
}

/// A rejection as grpcurl would report it.
pub fn rejected(program: &str, detail: &str) -> Result<Vec<u8>, XrayError> {
    Err(XrayError::Rejected {
        program: program.to_string(),
        detail: detail.to_string(),
    })
}
