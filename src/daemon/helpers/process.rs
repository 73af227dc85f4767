use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
};

use crate::daemon::config::HelperSpec;

/// A launched helper with its pipes.
pub struct HelperProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl HelperProcess {
    pub fn spawn(spec: &HelperSpec) -> Result<Self> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to launch {:?}", spec.program))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Helper stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Helper stdout is not piped"))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Writes one request token and returns the next line the helper prints. An error means
    /// the helper can't be talked to anymore.
    pub async fn request(&mut self, token: &str) -> Result<String> {
        let mut message = String::with_capacity(token.len() + 1);
        message.push_str(token);
        message.push('\n');
        self.stdin.write_all(message.as_bytes()).await?;
        self.stdin.flush().await?;

        self.stdout
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("Helper closed its output"))
    }

    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}
