//! Shell server — `execute_command` with a security blocklist.
//!
//! Commands run through `sh -c` with a hard timeout and a combined
//! output cap enforced before anything reaches the bus or the model
//! context. The blocklist is a `RegexSet` compiled once at construction;
//! a match rejects the command before any process is spawned.

use std::time::Duration;

use serde_json::{json, Value};

use trellis_domain::config::ShellConfig;
use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{ToolDescriptor, ToolResult};

use crate::server::{CallContext, ToolServer};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blocklist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Built-in deny patterns: destructive root deletions, fork bombs,
/// filesystem formatters, raw-device writes, privilege escalation,
/// shutdowns, and system-file redirection.
const DENIED_PATTERNS: &[&str] = &[
    r"(?i)\brm\s+(-[a-z]+\s+)*(/|--no-preserve-root)",
    r":\(\)\s*\{\s*:\s*\|\s*:",
    r"(?i)\bmkfs(\.\w+)?\b",
    r"(?i)\bdd\b.*\bof=/dev/(sd|hd|nvme|vd|mmcblk)",
    r"(?i)\b(sudo|doas|su)\b",
    r"(?i)\b(shutdown|reboot|halt|poweroff)\b",
    r">\s*/etc/",
    r"(?i)\bchown\s+(-[a-z]+\s+)*\w+(:\w+)?\s+/\s*$",
];

/// Compile the built-in deny set plus any configured extras.
pub fn build_denied_set(extra: &[String]) -> Result<regex::RegexSet> {
    let patterns: Vec<&str> = DENIED_PATTERNS
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .collect();
    regex::RegexSet::new(patterns)
        .map_err(|e| Error::Config(format!("invalid shell deny pattern: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `shell` tool server, owning one tool: `execute_command`.
pub struct ShellServer {
    denied: regex::RegexSet,
    config: ShellConfig,
}

impl ShellServer {
    pub fn new(config: ShellConfig) -> Result<Self> {
        let denied = build_denied_set(&config.extra_denied_patterns)?;
        Ok(Self { denied, config })
    }

    /// Blocklist verdict for a command. `Err(Blocked)` carries the reason.
    pub fn check_command(&self, command: &str) -> Result<()> {
        if command.trim().is_empty() {
            return Err(Error::Validation("command is empty".into()));
        }
        if self.denied.is_match(command) {
            return Err(Error::Blocked(format!(
                "command rejected by security policy: {}",
                command.chars().take(120).collect::<String>()
            )));
        }
        Ok(())
    }

    async fn execute(&self, command: &str, timeout_secs: Option<u64>) -> Result<ToolResult> {
        self.check_command(command)?;

        let timeout = Duration::from_secs(timeout_secs.unwrap_or(self.config.timeout_secs));

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let started = std::time::Instant::now();
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| Error::Tool {
                tool: "execute_command".into(),
                message: format!("spawn failed: {e}"),
            })?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "command exceeded {}s",
                    timeout.as_secs()
                )))
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        // Output cap before the result leaves this server.
        if combined.len() > self.config.max_output_bytes {
            let mut boundary = self.config.max_output_bytes;
            while boundary > 0 && !combined.is_char_boundary(boundary) {
                boundary -= 1;
            }
            combined.truncate(boundary);
            combined.push_str("\n[output truncated]");
        }

        let exit_code = output.status.code();
        let success = output.status.success();

        let metadata = json!({
            "exit_code": exit_code,
            "duration_ms": started.elapsed().as_millis() as u64,
        });

        let result = if success {
            ToolResult::text(combined)
        } else {
            ToolResult::error(format!(
                "command exited with {:?}:\n{combined}",
                exit_code
            ))
        };
        Ok(result.with_metadata(metadata))
    }
}

#[async_trait::async_trait]
impl ToolServer for ShellServer {
    fn name(&self) -> &str {
        "shell"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "execute_command".into(),
            description: "Run a shell command and return its combined output.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "timeout": { "type": "integer", "description": "Seconds" }
                },
                "required": ["command"]
            }),
        }]
    }

    fn call_timeout(&self, _tool: &str) -> Duration {
        // Registry-level guard sits above the per-command timeout.
        Duration::from_secs(self.config.timeout_secs + 5)
    }

    async fn call(&self, tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
        match tool {
            "execute_command" => {
                let command = args["command"].as_str().unwrap_or_default();
                let timeout = args["timeout"].as_u64();
                self.execute(command, timeout).await
            }
            other => Err(Error::Validation(format!("shell server has no tool {other}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ShellServer {
        ShellServer::new(ShellConfig::default()).unwrap()
    }

    #[test]
    fn blocks_destructive_root_deletion() {
        let err = server().check_command("rm -rf /").unwrap_err();
        assert!(matches!(err, Error::Blocked(_)));
    }

    #[test]
    fn blocks_known_dangerous_commands() {
        let shell = server();
        for cmd in [
            "rm -rf --no-preserve-root /home",
            ":(){ :|:& };:",
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda",
            "sudo cat /etc/shadow",
            "shutdown -h now",
            "echo pwned > /etc/passwd",
        ] {
            assert!(
                shell.check_command(cmd).is_err(),
                "should be blocked: {cmd}"
            );
        }
    }

    #[test]
    fn allows_ordinary_commands() {
        let shell = server();
        for cmd in [
            "ls -la",
            "echo hello",
            "grep -r TODO src",
            "cat README.md",
            "rm build/output.log",
        ] {
            assert!(shell.check_command(cmd).is_ok(), "should pass: {cmd}");
        }
    }

    #[test]
    fn empty_command_is_validation_error() {
        let err = server().check_command("   ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn extra_patterns_extend_the_blocklist() {
        let shell = ShellServer::new(ShellConfig {
            extra_denied_patterns: vec![r"(?i)\bcurl\b".into()],
            ..ShellConfig::default()
        })
        .unwrap();
        assert!(shell.check_command("curl https://example.com").is_err());
        assert!(shell.check_command("echo ok").is_ok());
    }

    #[tokio::test]
    async fn executes_and_captures_output() {
        let result = server().execute("echo hello", None).await.unwrap();
        assert!(!result.is_error);
        assert!(result.joined_text().contains("hello"));
        assert_eq!(result.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_result() {
        let result = server().execute("exit 3", None).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.metadata["exit_code"], 3);
    }

    #[tokio::test]
    async fn blocked_command_never_spawns() {
        let err = server().execute("rm -rf /", None).await.unwrap_err();
        assert!(matches!(err, Error::Blocked(_)));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let shell = ShellServer::new(ShellConfig {
            max_output_bytes: 100,
            ..ShellConfig::default()
        })
        .unwrap();
        let result = shell.execute("yes x | head -c 5000", None).await.unwrap();
        let text = result.joined_text();
        assert!(text.len() < 200);
        assert!(text.contains("[output truncated]"));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let result = server().execute("sleep 30", Some(1)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout(_)));
    }
}
