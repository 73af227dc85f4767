use std::{process::Stdio, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::daemon::config::CommandSpec;

use super::MediaProbe;

/// Runs a command for every query and reads whether media is playing from its output. The
/// command is killed when it runs longer than `timeout`.
pub struct CommandMediaProbe {
    spec: CommandSpec,
    timeout: Duration,
}

impl CommandMediaProbe {
    pub fn new(spec: CommandSpec, timeout: Duration) -> Self {
        Self { spec, timeout }
    }

    async fn run(&self) -> Result<bool> {
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("Media command timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            return Err(anyhow!("Media command exited with {}", output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_playing(stdout.lines().next().unwrap_or_default()))
    }
}

pub fn parse_playing(line: &str) -> bool {
    let line = line.trim();
    ["true", "1", "yes", "playing"]
        .iter()
        .any(|v| line.eq_ignore_ascii_case(v))
}

#[async_trait]
impl MediaProbe for CommandMediaProbe {
    async fn is_playing(&self) -> bool {
        match self.run().await {
            Ok(playing) => {
                debug!("Media playing: {playing}");
                playing
            }
            Err(e) => {
                warn!("Media probe failed {e:?}");
                false
            }
        }
    }
}
