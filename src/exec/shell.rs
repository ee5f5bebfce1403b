// src/exec/shell.rs

//! `shell` operator: runs the asset's or check's command in a subprocess.

use std::process::Stdio;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dag::TaskInstance;
use crate::exec::operator::{Operator, OperatorFuture};
use crate::exec::ExecutionContext;
use crate::types::InstanceKind;

/// Runs `sh -c <cmd>` (`cmd /C` on Windows).
///
/// - main instances use the asset's `cmd`
/// - check instances use the check's `cmd`
/// - exported: `ASSET_NAME`, `START_DATE`, `END_DATE`, `RUN_ID` plus the
///   selected environment's variables
/// - stdout is logged at info, stderr at debug
/// - a non-zero exit is an error; cancellation kills the child
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellOperator;

impl Operator for ShellOperator {
    fn run<'a>(&'a self, ctx: &'a ExecutionContext, instance: &'a TaskInstance) -> OperatorFuture<'a> {
        Box::pin(run_shell(ctx, instance))
    }
}

/// The command an instance runs, if any.
pub fn command_for(instance: &TaskInstance) -> Option<&str> {
    match instance.kind() {
        InstanceKind::Main => instance.asset().cmd.as_deref(),
        InstanceKind::ColumnCheck | InstanceKind::CustomCheck => {
            instance.check().and_then(|c| c.cmd())
        }
        InstanceKind::MetadataPush => None,
    }
}

async fn run_shell(ctx: &ExecutionContext, instance: &TaskInstance) -> Result<()> {
    let script = command_for(instance)
        .ok_or_else(|| anyhow!("instance '{instance}' has no `cmd` to run"))?;

    info!(
        instance = %instance,
        run_id = %ctx.run_id,
        cmd = %script,
        "starting shell process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    };

    if let Some(dir) = instance.pipeline().root_dir.as_ref() {
        cmd.current_dir(dir);
    }

    cmd.envs(ctx.variables.iter())
        .env("ASSET_NAME", instance.asset_name())
        .env("START_DATE", ctx.start_date_str())
        .env("END_DATE", ctx.end_date_str())
        .env("RUN_ID", ctx.run_id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for '{instance}'"))?;

    // Always consume both pipes so buffers don't fill.
    if let Some(stdout) = child.stdout.take() {
        let id = instance.human_id().to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(instance = %id, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let id = instance.human_id().to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(instance = %id, "stderr: {}", line);
            }
        });
    }

    let mut cancel = ctx.cancel.clone();

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of '{instance}'"))?;
            let code = status.code().unwrap_or(-1);

            debug!(
                instance = %instance,
                exit_code = code,
                success = status.success(),
                "shell process exited"
            );

            if !status.success() {
                bail!("command exited with code {code}");
            }
            Ok(())
        }

        _ = cancel.cancelled() => {
            info!(instance = %instance, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(instance = %instance, error = %e, "failed to kill child process on cancellation");
            }
            bail!("cancelled while running")
        }
    }
}
