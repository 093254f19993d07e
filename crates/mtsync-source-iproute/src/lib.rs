// # iproute2 Interface Source
//
// Reads the global-scope IPv6 address of one local interface by running
// `ip -6 addr show <ifname>` and scanning its output.
//
// ## Behavior
//
// - The first line containing both `inet6` and `scope global` wins
// - The address is the second whitespace token with the prefix length
//   stripped (`2001:db8::10/64` becomes `2001:db8::10`)
// - No matching line is `Ok(None)`, not an error
// - A failed spawn, a non-zero exit or a timeout is `Error::LocalSource`
//
// The interface name is an `InterfaceName`, so it has already been checked
// for shell metacharacters; it is passed as a separate argv entry either way.

use async_trait::async_trait;
use mtsync_core::traits::InterfaceSource;
use mtsync_core::{Error, InterfaceName, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Bound on one `ip` invocation
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Interface address lookup through the `ip` binary
#[derive(Debug, Clone)]
pub struct IprouteSource {
    interface: InterfaceName,
    program: String,
}

impl IprouteSource {
    pub fn new(interface: InterfaceName) -> Self {
        Self {
            interface,
            program: "ip".to_string(),
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run_ip(&self) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(["-6", "addr", "show", self.interface.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(COMMAND_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                Error::local_source(format!(
                    "`{} -6 addr show {}` timed out after {:?}",
                    self.program, self.interface, COMMAND_TIMEOUT
                ))
            })?
            .map_err(|e| Error::local_source(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::local_source(format!(
                "`{} -6 addr show {}` exited with {}: {}",
                self.program,
                self.interface,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Extract the first global-scope IPv6 address from `ip -6 addr show` output
pub fn parse_global_ipv6(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("inet6") && line.contains("scope global"))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|token| token.split('/').next().unwrap_or(token).to_string())
        .filter(|address| !address.is_empty())
}

#[async_trait]
impl InterfaceSource for IprouteSource {
    async fn global_ipv6(&self) -> Result<Option<String>> {
        let output = self.run_ip().await?;
        let address = parse_global_ipv6(&output);

        tracing::debug!(
            "Interface {} global IPv6: {}",
            self.interface,
            address.as_deref().unwrap_or("<none>")
        );

        Ok(address)
    }

    fn interface_name(&self) -> &str {
        self.interface.as_str()
    }
}
