use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info};
use mac_address::MacAddress;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use crate::config::BluetoothConfig;
use crate::radio::{RadioStack, StackError, parse_addresses};

/// Where each external tool lives. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub bluetoothctl: PathBuf,
    pub hcitool: PathBuf,
    pub l2ping: PathBuf,
    pub bt_agent: PathBuf,
    pub sudo: PathBuf,
}

impl Tools {
    pub fn in_dir(dir: Option<&Path>) -> Self {
        let locate = |name: &str| dir.map_or_else(|| PathBuf::from(name), |dir| dir.join(name));
        Tools {
            bluetoothctl: locate("bluetoothctl"),
            hcitool: locate("hcitool"),
            l2ping: locate("l2ping"),
            bt_agent: locate("bt-agent"),
            sudo: locate("sudo"),
        }
    }
}

/// Talks to BlueZ through its command-line tools.
#[derive(Debug, Clone)]
pub struct BluezCli {
    tools: Tools,
    timeout: Duration,
    agent_capability: String,
    agent_use_sudo: bool,
}

impl BluezCli {
    pub fn new(config: &BluetoothConfig, timeout: Duration) -> Self {
        BluezCli {
            tools: Tools::in_dir(config.tool_dir.as_deref()),
            timeout,
            agent_capability: config
                .agent_capability
                .clone()
                .unwrap_or_else(|| "NoInputNoOutput".to_string()),
            agent_use_sudo: config.agent_use_sudo.unwrap_or(true),
        }
    }

    async fn run(
        &self,
        program: &Path,
        args: &[&str],
        input: Option<String>,
    ) -> Result<String, StackError> {
        run_with_timeout(program, args, input, self.timeout).await
    }

    /// Feeds interactive commands to a one-off `bluetoothctl` session.
    async fn script(&self, lines: &[String]) -> Result<String, StackError> {
        let mut input = lines.join("\n");
        input.push('\n');
        self.run(&self.tools.bluetoothctl, &[], Some(input)).await
    }
}

/// Runs `program` to completion and returns its stdout. The child is killed if it outlives `limit`.
pub async fn run_with_timeout(
    program: &Path,
    args: &[&str],
    input: Option<String>,
    limit: Duration,
) -> Result<String, StackError> {
    let name = program.display().to_string();
    debug!("Running {} {}", name, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| StackError::Launch {
        program: name.clone(),
        source,
    })?;

    let finished = async move {
        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) {
            stdin.write_all(input.as_bytes()).await?;
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(limit, finished).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(StackError::Io { program: name, source }),
        Err(_) => {
            return Err(StackError::Unresponsive {
                program: name,
                after: limit,
            });
        }
    };

    if !output.status.success() {
        debug!(
            "{} stderr: {}",
            name,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(StackError::Failed {
            program: name,
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl RadioStack for BluezCli {
    async fn connected_addresses(&self) -> Result<Vec<MacAddress>, StackError> {
        let stdout = self.run(&self.tools.hcitool, &["con"], None).await?;
        Ok(parse_addresses(&stdout))
    }

    async fn paired_addresses(&self) -> Result<Vec<MacAddress>, StackError> {
        let stdout = self
            .run(&self.tools.bluetoothctl, &["paired-devices"], None)
            .await?;
        Ok(parse_addresses(&stdout))
    }

    async fn remove(&self, address: &MacAddress) -> Result<(), StackError> {
        self.run(&self.tools.bluetoothctl, &["remove", &address.to_string()], None)
            .await
            .map(drop)
    }

    async fn trust(&self, address: &MacAddress) -> Result<(), StackError> {
        self.script(&[format!("trust {address}")]).await.map(drop)
    }

    async fn connect(&self, address: &MacAddress) -> Result<(), StackError> {
        self.run(&self.tools.bluetoothctl, &["connect", &address.to_string()], None)
            .await
            .map(drop)
    }

    async fn ping(&self, address: &MacAddress) -> Result<(), StackError> {
        self.run(&self.tools.l2ping, &["-c", "1", &address.to_string()], None)
            .await
            .map(drop)
    }

    async fn start_agent(&self) -> Result<(), StackError> {
        let mut command = if self.agent_use_sudo {
            let mut sudo = Command::new(&self.tools.sudo);
            sudo.arg(&self.tools.bt_agent);
            sudo
        } else {
            Command::new(&self.tools.bt_agent)
        };
        command.args(["-c", self.agent_capability.as_str()]);

        info!("Starting Bluetooth agent...");
        // Never awaited; the agent keeps running after we return.
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| StackError::Launch {
                program: command.as_std().get_program().to_string_lossy().into_owned(),
                source,
            })
    }

    async fn start_advertising(&self, alias: &str) -> Result<(), StackError> {
        info!("Starting Bluetooth advertising...");
        let lines = [
            "power on".to_string(),
            "discoverable on".to_string(),
            "pairable on".to_string(),
            "advertise on".to_string(),
            format!("system-alias {alias}"),
        ];
        self.script(&lines).await.map(drop)
    }
}
