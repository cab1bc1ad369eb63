//! External inference executable driven over stdin/stdout.

use super::LocalModel;
use crate::backends::prompt;
use crate::config::LocalModelConfig;
use crate::error::ModelError;
use crate::types::{GenerationParams, LanguagePair, Task};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// A model served by a local executable.
///
/// The prompt is written to the child's stdin while its stdout and stderr are
/// drained. `{max_tokens}` and `{temperature}` in the configured arguments
/// are substituted per call. Dropping a pending `generate` kills the child.
#[derive(Debug)]
pub struct CommandModel {
    program: PathBuf,
    args: Vec<String>,
    languages: LanguagePair,
}

impl CommandModel {
    /// Verify the executable runs, then keep it as the model handle.
    pub async fn load(config: &LocalModelConfig) -> Result<Self, ModelError> {
        let program = config.program.clone().ok_or_else(|| ModelError::LoadFailed {
            message: "no program configured for the command runtime".to_string(),
        })?;

        let output = Command::new(&program)
            .args(&config.probe_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ModelError::LoadFailed {
                message: format!("cannot run {}: {e}", program.display()),
            })?;
        if !output.status.success() {
            return Err(ModelError::LoadFailed {
                message: format!(
                    "{} probe exited with {}: {}",
                    program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        debug!(program = %program.display(), "Command model probe succeeded");
        Ok(Self {
            program,
            args: config.args.clone(),
            languages: config.languages(),
        })
    }

    fn render_args(&self, params: &GenerationParams) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{max_tokens}", &params.max_tokens.to_string())
                    .replace("{temperature}", &params.temperature.to_string())
            })
            .collect()
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait]
impl LocalModel for CommandModel {
    fn supports(&self, _task: Task) -> bool {
        true
    }

    async fn generate(
        &mut self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let input = prompt::build(task, text, &self.languages);

        let mut child = Command::new(&self.program)
            .args(self.render_args(params))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut pipe) = stdin {
                // A child may exit before consuming its whole input.
                match pipe.write_all(input.as_bytes()).await {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };

        let (_, stdout, stderr) = tokio::try_join!(
            feed,
            drain(child.stdout.take()),
            drain(child.stderr.take())
        )?;
        let status = child.wait().await?;
        if !status.success() {
            return Err(ModelError::Generation {
                message: format!(
                    "model process exited with {}: {}",
                    status,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            });
        }

        let completion = String::from_utf8(stdout).map_err(|e| ModelError::Generation {
            message: format!("model output is not UTF-8: {e}"),
        })?;
        Ok(completion.trim().to_string())
    }
}
