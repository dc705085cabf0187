use std::{
    marker::{Send, Sync},
    process::Stdio,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::{io::AsyncWriteExt as _, process::Command};

/// Upper bound for a single external-tool invocation. Partitioning, LUKS
/// formatting and LVM operations finish well within this; expiry is a fatal
/// stage failure, never a retry (a partially-completed destructive operation
/// is not safely retryable).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[async_trait]
pub trait CheckCommandOutput {
    /// Run with no stdin and the default timeout, requiring exit code 0.
    async fn run(&mut self) -> Result<Vec<u8>>;

    /// Run with the given bytes piped to stdin, requiring exit code 0.
    ///
    /// This is the only channel through which secrets reach external tools:
    /// stdin is neither visible in the process list nor recorded in shell
    /// history, and the input is never echoed into error reports.
    async fn run_with_input(&mut self, input_bytes: &[u8]) -> Result<Vec<u8>>;

    /// Run with a caller-chosen timeout, requiring exit code 0.
    async fn run_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Run and let `f(code, stdout, stderr)` decide the outcome.
    async fn run_with_status_checker<R>(
        &mut self,
        input_bytes: Option<&[u8]>,
        timeout: Duration,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R>;
}

#[async_trait]
impl CheckCommandOutput for Command {
    async fn run(&mut self) -> Result<Vec<u8>> {
        self.run_with_timeout(DEFAULT_TIMEOUT).await
    }

    async fn run_with_input(&mut self, input_bytes: &[u8]) -> Result<Vec<u8>> {
        self.run_with_status_checker(Some(input_bytes), DEFAULT_TIMEOUT, expect_success)
            .await
    }

    async fn run_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.run_with_status_checker(None, timeout, expect_success)
            .await
    }

    async fn run_with_status_checker<R>(
        &mut self,
        input_bytes: Option<&[u8]>,
        timeout: Duration,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R> {
        // reset all locale settings for this command
        self.env("LC_ALL", "C");

        tracing::trace!(cmd=?self.as_std(), "run external cmd");

        async {
            let output = async {
                if input_bytes.is_some() {
                    self.stdin(Stdio::piped());
                } else {
                    self.stdin(Stdio::null());
                }
                self.stdout(Stdio::piped());
                self.stderr(Stdio::piped());

                let mut child = self.kill_on_drop(true).spawn()?;

                if let Some(input_bytes) = input_bytes {
                    let mut stdin = child.stdin.take().context("No stdin")?;
                    stdin.write_all(input_bytes).await?;
                    stdin.shutdown().await?;
                }

                match tokio::time::timeout(timeout, child.wait_with_output()).await {
                    // kill_on_drop reaps the child when the timeout fires
                    Err(_) => bail!("timed out after {}s", timeout.as_secs()),
                    Ok(output) => output.map_err(anyhow::Error::from),
                }
            }
            .await
            .with_context(|| format!("cmd: {:?}", self.as_std()))?;

            let stdout = output.stdout;
            let stderr = output.stderr;
            let code = output.status.code();

            match code {
                Some(code) => f(code, stdout.clone(), stderr.clone()),
                None => Err(anyhow!("killed by signal")),
            }
            .with_context(|| {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr);
                format!(
                    "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
                    self.as_std(),
                    code.map(|code| code.to_string())
                        .unwrap_or("unknown".to_string()),
                    if stdout.contains('\n') {
                        format!("(multi-line)\n\t{}", stdout.replace('\n', "\n\t"))
                    } else {
                        stdout.into()
                    },
                    if stderr.contains('\n') {
                        format!("(multi-line)\n\t{}", stderr.replace('\n', "\n\t"))
                    } else {
                        stderr.into()
                    },
                )
            })
        }
        .await
        .context("Failed to execute external command")
    }
}

fn expect_success(code: i32, stdout: Vec<u8>, _stderr: Vec<u8>) -> Result<Vec<u8>> {
    if code != 0 {
        bail!("Bad exit code")
    } else {
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn captures_stdout() -> Result<()> {
        let stdout = Command::new("echo").arg("hello").run().await?;
        assert_eq!(String::from_utf8(stdout)?.trim(), "hello");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pipes_stdin() -> Result<()> {
        let stdout = Command::new("cat").run_with_input(b"secret\n").await?;
        assert_eq!(stdout, b"secret\n");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nonzero_exit_is_an_error() {
        let res = Command::new("false").run().await;
        assert!(res.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_checker_sees_exit_code() -> Result<()> {
        let code = Command::new("false")
            .run_with_status_checker(None, DEFAULT_TIMEOUT, |code, _, _| Ok(code))
            .await?;
        assert_eq!(code, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_expiry_is_fatal() {
        let res = Command::new("sleep")
            .arg("5")
            .run_with_timeout(Duration::from_millis(100))
            .await;
        let err = format!("{:#}", res.unwrap_err());
        assert!(err.contains("timed out"), "{err}");
    }
}
