//! Embedded interpreter capability boundary.
//!
//! The engine only sees the `Interpreter` trait: execute a source string with
//! a preset stdin and get back captured stdout or a fault. Every call runs in
//! a fresh execution scope with a fresh output buffer bound to that call, so
//! no bindings or stream state leak between calls. The production
//! implementation keeps one sandboxed container per process and spawns a new
//! interpreter process inside it per execution.

use crate::config::SandboxConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use praxis_common::errors::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Safety limits to prevent pathological inputs from reaching the sandbox
const MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// coreutils `timeout` exits with 124 when it had to kill the command.
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Slack on top of the in-container kill before the outer guard gives up on
/// a wedged exec stream.
const EXEC_GRACE: Duration = Duration::from_secs(3);

/// Result of one isolated execution. A fault is data, never a Rust error:
/// the caller records it per test case and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterOutcome {
    Completed { stdout: String },
    Faulted { error: String },
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Execute `source` once with `stdin` preset and a fresh capture buffer.
    async fn execute(&self, source: &str, stdin: &str) -> InterpreterOutcome;

    /// Release the underlying capability. Default is a no-op.
    async fn shutdown(&self) {}
}

/// The `initialize(options) -> Handle | Error` boundary: acquiring the
/// capability is the only fallible step, and it happens once.
#[async_trait]
pub trait InterpreterProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn Interpreter>, EngineError>;
}

/// Provider that launches a sandboxed Docker container on first acquisition.
pub struct DockerProvider {
    config: SandboxConfig,
}

impl DockerProvider {
    pub fn new(config: SandboxConfig) -> Self {
        DockerProvider { config }
    }
}

#[async_trait]
impl InterpreterProvider for DockerProvider {
    async fn acquire(&self) -> Result<Arc<dyn Interpreter>, EngineError> {
        let interpreter = DockerInterpreter::launch(&self.config).await?;
        Ok(Arc::new(interpreter))
    }
}

/// Docker-backed interpreter.
///
/// One long-lived container per process, held alive with a sleep command:
/// - Network disabled
/// - Memory/CPU limits from config
/// Each `execute` call is a `docker exec` of a fresh `python3` process, which
/// is what guarantees the scope-per-call isolation contract: nothing defined
/// by one test case survives into the next.
pub struct DockerInterpreter {
    docker: Docker,
    container_id: String,
    timeout_ms: u64,
}

impl DockerInterpreter {
    pub async fn launch(config: &SandboxConfig) -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(format!("docker daemon: {}", e)))?;

        ensure_image(&docker, &config.image).await?;

        let container_name = format!("praxis-{}", uuid::Uuid::new_v4());
        let memory_limit = (config.memory_limit_mb as i64) * 1024 * 1024;
        let nano_cpus = (config.cpu_limit as f64 * 1_000_000_000.0) as i64;

        let container_config = Config {
            image: Some(config.image.clone()),
            // Keep the container alive; executions are exec'd into it
            cmd: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "sleep infinity".to_string(),
            ]),
            entrypoint: Some(vec![]),
            network_disabled: Some(true), // SECURITY: no network for learner code
            host_config: Some(bollard::models::HostConfig {
                memory: Some(memory_limit),
                nano_cpus: Some(nano_cpus),
                ..Default::default()
            }),
            working_dir: Some("/sandbox".to_string()),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| EngineError::Unavailable(format!("create container: {}", e)))?;

        let container_id = container.id.clone();

        if let Err(e) = docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            // Container exists but will not start; remove it before failing
            remove_container(&docker, &container_id).await;
            return Err(EngineError::Unavailable(format!("start container: {}", e)));
        }

        info!(container_id = %container_id, image = %config.image, "sandbox container started");

        Ok(DockerInterpreter {
            docker,
            container_id,
            timeout_ms: config.execution_timeout_ms,
        })
    }
}

#[async_trait]
impl Interpreter for DockerInterpreter {
    async fn execute(&self, source: &str, stdin: &str) -> InterpreterOutcome {
        if source.len() > MAX_SOURCE_BYTES {
            return InterpreterOutcome::Faulted {
                error: format!("source exceeds maximum size of {} bytes", MAX_SOURCE_BYTES),
            };
        }
        if stdin.len() > MAX_STDIN_BYTES {
            return InterpreterOutcome::Faulted {
                error: format!("input exceeds maximum size of {} bytes", MAX_STDIN_BYTES),
            };
        }

        // Fresh scope per call: a new python process, a unique scratch file
        let cell = format!("/tmp/cell-{}.py", uuid::Uuid::new_v4());
        let source_b64 = general_purpose::STANDARD.encode(source);
        let stdin_b64 = general_purpose::STANDARD.encode(stdin);
        let timeout_secs = self.timeout_ms.div_ceil(1000).max(1);
        let script = exec_script(&source_b64, &stdin_b64, &cell, timeout_secs);

        let exec_config = CreateExecOptions {
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = match self.docker.create_exec(&self.container_id, exec_config).await {
            Ok(exec) => exec,
            Err(e) => {
                return InterpreterOutcome::Faulted {
                    error: format!("sandbox exec setup failed: {}", e),
                }
            }
        };

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let execution = async {
            let output = self.docker.start_exec(&exec.id, Some(start_config)).await?;

            let mut stdout = String::new();
            let mut stderr = String::new();

            if let StartExecResults::Attached { mut output, .. } = output {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            stderr.push_str(&format!("\n[stream error: {}]", e));
                            break;
                        }
                    }
                }
            }

            let inspect = self.docker.inspect_exec(&exec.id).await?;
            Ok::<(String, String, Option<i64>), bollard::errors::Error>((
                stdout,
                stderr,
                inspect.exit_code,
            ))
        };

        // The in-container `timeout` is what actually kills a hung program;
        // the outer guard only covers a wedged exec stream, and leaves the
        // process to the in-container kill either way.
        let deadline = Duration::from_millis(self.timeout_ms) + EXEC_GRACE;
        match tokio::time::timeout(deadline, execution).await {
            Ok(Ok((stdout, stderr, exit_code))) => {
                match exit_code {
                    Some(0) => debug!(bytes = stdout.len(), "execution completed"),
                    code => warn!(exit_code = ?code, "execution faulted"),
                }
                outcome_from_exit(exit_code, stdout, stderr, self.timeout_ms)
            }
            Ok(Err(e)) => InterpreterOutcome::Faulted {
                error: format!("sandbox execution error: {}", e),
            },
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms, "exec stream stalled past deadline");
                InterpreterOutcome::Faulted {
                    error: format!("execution timed out after {}ms", self.timeout_ms),
                }
            }
        }
    }

    async fn shutdown(&self) {
        remove_container(&self.docker, &self.container_id).await;
        info!(container_id = %self.container_id, "sandbox container removed");
    }
}

/// Shell command for one execution: materialize the source, pipe in the
/// preset stdin, and run it under coreutils `timeout` so a hung program is
/// killed inside the container instead of looping forever against the
/// sandbox's CPU/memory caps.
fn exec_script(source_b64: &str, stdin_b64: &str, cell: &str, timeout_secs: u64) -> String {
    format!(
        "echo '{source_b64}' | base64 -d > {cell} && \
         echo '{stdin_b64}' | base64 -d | timeout -k 1 {timeout_secs} python3 -u {cell}; \
         status=$?; rm -f {cell}; exit $status"
    )
}

fn outcome_from_exit(
    exit_code: Option<i64>,
    stdout: String,
    stderr: String,
    timeout_ms: u64,
) -> InterpreterOutcome {
    match exit_code {
        Some(0) => InterpreterOutcome::Completed { stdout },
        Some(TIMEOUT_EXIT_CODE) => InterpreterOutcome::Faulted {
            error: format!("execution timed out after {}ms", timeout_ms),
        },
        code => {
            let error = if stderr.trim().is_empty() {
                format!("process exited with code {:?}", code)
            } else {
                stderr.trim().to_string()
            };
            InterpreterOutcome::Faulted { error }
        }
    }
}

/// Verify the sandbox image exists locally, pulling it if missing.
async fn ensure_image(docker: &Docker, image: &str) -> Result<(), EngineError> {
    if docker.inspect_image(image).await.is_ok() {
        debug!("image cache hit: {}", image);
        return Ok(());
    }

    warn!("image cache miss: {} (pulling now)", image);

    let options = Some(CreateImageOptions {
        from_image: image,
        ..Default::default()
    });

    let mut stream = docker.create_image(options, None, None);
    while let Some(result) = stream.next().await {
        result.map_err(|e| EngineError::Unavailable(format!("pull image '{}': {}", image, e)))?;
    }

    info!("image pulled: {}", image);
    Ok(())
}

async fn remove_container(docker: &Docker, container_id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    if let Err(e) = docker.remove_container(container_id, Some(options)).await {
        warn!(container_id = %container_id, error = %e, "failed to remove sandbox container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_script_runs_under_a_kill_timeout() {
        let script = exec_script("cHJpbnQoMSk=", "aW4=", "/tmp/cell-x.py", 5);
        assert!(script.contains("timeout -k 1 5 python3 -u /tmp/cell-x.py"));
        assert!(script.contains("rm -f /tmp/cell-x.py"));
        assert!(script.contains("echo 'cHJpbnQoMSk=' | base64 -d > /tmp/cell-x.py"));
    }

    #[test]
    fn test_exit_zero_is_completion() {
        let outcome = outcome_from_exit(Some(0), "42\n".to_string(), String::new(), 5000);
        assert_eq!(
            outcome,
            InterpreterOutcome::Completed {
                stdout: "42\n".to_string()
            }
        );
    }

    #[test]
    fn test_timeout_exit_code_maps_to_timeout_fault() {
        let outcome = outcome_from_exit(Some(124), String::new(), String::new(), 2000);
        assert_eq!(
            outcome,
            InterpreterOutcome::Faulted {
                error: "execution timed out after 2000ms".to_string()
            }
        );
    }

    #[test]
    fn test_nonzero_exit_surfaces_stderr() {
        let stderr = "Traceback (most recent call last):\n  ...\nIndexError: list index out of range\n";
        let outcome = outcome_from_exit(Some(1), String::new(), stderr.to_string(), 5000);
        match outcome {
            InterpreterOutcome::Faulted { error } => {
                assert!(error.ends_with("IndexError: list index out of range"));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_nonzero_exit_without_stderr_reports_code() {
        let outcome = outcome_from_exit(Some(2), String::new(), "  \n".to_string(), 5000);
        assert_eq!(
            outcome,
            InterpreterOutcome::Faulted {
                error: "process exited with code Some(2)".to_string()
            }
        );
    }
}
