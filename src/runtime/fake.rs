//! In-memory runtime used by tests
//!
//! Tracks instances by name so tests can assert how many are left alive,
//! and records every call in order.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use super::{Attach, CommandOutput, ContainerRuntime, RunSpec};
use crate::error::{PodError, Result};

#[derive(Debug, Clone)]
pub struct FakeInstance {
    pub image: String,
    pub running: bool,
}

#[derive(Debug)]
struct FakeState {
    instances: BTreeMap<String, FakeInstance>,
    calls: Vec<String>,
    build_result: CommandOutput,
    push_result: CommandOutput,
    run_failure: Option<String>,
    /// Failed probes before the workload answers; `None` never answers
    ready_after: Option<u32>,
    probes_seen: u32,
    exec_responses: HashMap<String, CommandOutput>,
    stop_fails: bool,
    /// Process spawned in place of the attached surface
    session_command: Vec<String>,
    /// The instance exits as soon as a session is attached
    die_on_attach: bool,
}

/// Scriptable [`ContainerRuntime`] for tests
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                instances: BTreeMap::new(),
                calls: Vec::new(),
                build_result: CommandOutput::ok("built"),
                push_result: CommandOutput::ok("pushed"),
                run_failure: None,
                ready_after: Some(0),
                probes_seen: 0,
                exec_responses: HashMap::new(),
                stop_fails: false,
                session_command: vec!["true".to_string()],
                die_on_attach: false,
            }),
        }
    }

    pub fn with_build_result(self, out: CommandOutput) -> Self {
        self.lock().build_result = out;
        self
    }

    pub fn with_push_result(self, out: CommandOutput) -> Self {
        self.lock().push_result = out;
        self
    }

    pub fn with_run_failure(self, message: &str) -> Self {
        self.lock().run_failure = Some(message.to_string());
        self
    }

    pub fn ready_after(self, failed_probes: u32) -> Self {
        self.lock().ready_after = Some(failed_probes);
        self
    }

    pub fn never_ready(self) -> Self {
        self.lock().ready_after = None;
        self
    }

    /// Canned response for `exec` of this exact command line
    pub fn with_exec(self, command: &[&str], out: CommandOutput) -> Self {
        self.lock().exec_responses.insert(command.join(" "), out);
        self
    }

    pub fn with_stop_failure(self) -> Self {
        self.lock().stop_fails = true;
        self
    }

    pub fn with_session_command(self, command: &[&str]) -> Self {
        self.lock().session_command = command.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn die_on_attach(self) -> Self {
        self.lock().die_on_attach = true;
        self
    }

    /// Pretend an instance already exists (e.g. left over from a crashed run)
    pub fn with_instance(self, name: &str, image: &str, running: bool) -> Self {
        self.lock().instances.insert(
            name.to_string(),
            FakeInstance { image: image.to_string(), running },
        );
        self
    }

    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn running_count(&self) -> usize {
        self.lock().instances.values().filter(|i| i.running).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn probes_seen(&self) -> u32 {
        self.lock().probes_seen
    }

    /// Mark an instance as exited without removing it
    pub fn kill_instance(&self, name: &str) {
        if let Some(instance) = self.lock().instances.get_mut(name) {
            instance.running = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

fn no_such(name: &str) -> CommandOutput {
    CommandOutput::failed(1, format!("Error: No such container: {}", name))
}

impl ContainerRuntime for FakeRuntime {
    fn build(&self, context: &Path, tag: &str, no_cache: bool) -> Result<CommandOutput> {
        self.record(format!("build {} {} no_cache={}", context.display(), tag, no_cache));
        Ok(self.lock().build_result.clone())
    }

    fn tag(&self, source: &str, target: &str) -> Result<CommandOutput> {
        self.record(format!("tag {} {}", source, target));
        Ok(CommandOutput::ok(""))
    }

    fn push(&self, reference: &str) -> Result<CommandOutput> {
        self.record(format!("push {}", reference));
        Ok(self.lock().push_result.clone())
    }

    fn run_detached(&self, spec: &RunSpec) -> Result<CommandOutput> {
        self.record(format!("run {} {}", spec.name, spec.image));
        let mut state = self.lock();
        if let Some(message) = &state.run_failure {
            return Ok(CommandOutput::failed(125, message.clone()));
        }
        if state.instances.contains_key(&spec.name) {
            return Ok(CommandOutput::failed(
                125,
                format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            ));
        }
        state.instances.insert(
            spec.name.clone(),
            FakeInstance { image: spec.image.clone(), running: true },
        );
        Ok(CommandOutput::ok("0123456789ab"))
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        self.record(format!("is_running {}", name));
        Ok(self.lock().instances.get(name).map(|i| i.running).unwrap_or(false))
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.record(format!("exists {}", name));
        Ok(self.lock().instances.contains_key(name))
    }

    fn exec(&self, name: &str, command: &[&str]) -> Result<CommandOutput> {
        let line = command.join(" ");
        self.record(format!("exec {} {}", name, line));
        let mut state = self.lock();
        let running = state.instances.get(name).map(|i| i.running).unwrap_or(false);
        if !running {
            return Ok(no_such(name));
        }
        if let Some(out) = state.exec_responses.get(&line) {
            return Ok(out.clone());
        }
        // Anything without a canned response is treated as a readiness probe
        state.probes_seen += 1;
        match state.ready_after {
            Some(n) if state.probes_seen > n => Ok(CommandOutput::ok("")),
            _ => Ok(CommandOutput::failed(1, "workload not ready yet")),
        }
    }

    fn exec_interactive(&self, name: &str, command: &[&str], attach: Attach) -> Result<Child> {
        self.record(format!("attach {} {} {:?}", name, command.join(" "), attach));
        let session = {
            let mut state = self.lock();
            if state.die_on_attach {
                if let Some(instance) = state.instances.get_mut(name) {
                    instance.running = false;
                }
            }
            state.session_command.clone()
        };
        let (program, args) = session
            .split_first()
            .ok_or_else(|| PodError::Runtime("empty session command".to_string()))?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PodError::Runtime(format!("failed to spawn fake session: {}", e)))
    }

    fn stop(&self, name: &str) -> Result<CommandOutput> {
        self.record(format!("stop {}", name));
        let mut state = self.lock();
        if state.stop_fails {
            return Ok(CommandOutput::failed(1, "stop timed out"));
        }
        match state.instances.get_mut(name) {
            Some(instance) => {
                instance.running = false;
                Ok(CommandOutput::ok(name))
            }
            None => Ok(no_such(name)),
        }
    }

    fn remove(&self, name: &str, force: bool) -> Result<CommandOutput> {
        self.record(format!("rm {} force={}", name, force));
        let mut state = self.lock();
        match state.instances.get(name).map(|i| i.running) {
            Some(true) if !force => Ok(CommandOutput::failed(
                1,
                format!("cannot remove running container {}", name),
            )),
            Some(_) => {
                state.instances.remove(name);
                Ok(CommandOutput::ok(name))
            }
            None => Ok(no_such(name)),
        }
    }

    fn list_instances(&self, name: &str, image: &str) -> Result<Vec<String>> {
        self.record(format!("list {} {}", name, image));
        Ok(self
            .lock()
            .instances
            .iter()
            .filter(|(n, i)| n.as_str() == name || i.image == image)
            .map(|(n, _)| n.clone())
            .collect())
    }

    fn logs_tail(&self, name: &str, lines: usize) -> Result<CommandOutput> {
        self.record(format!("logs {} {}", name, lines));
        if self.lock().instances.contains_key(name) {
            Ok(CommandOutput::ok("workload booted\n"))
        } else {
            Ok(no_such(name))
        }
    }

    fn inspect_state(&self, name: &str) -> Result<CommandOutput> {
        self.record(format!("inspect {}", name));
        match self.lock().instances.get(name) {
            Some(i) => Ok(CommandOutput::ok(format!("{{\"Running\":{}}}", i.running))),
            None => Ok(no_such(name)),
        }
    }
}
