//! Engine capability interface and the shell-command implementation.
//!
//! The orchestrator's state machine depends only on these traits, so a
//! scripted fake can stand in for the real engine in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use calamine::Reader;
use tokio::process::{Child, Command};

use refreshd_core::{EngineCommands, RefreshdError, Result};

/// The external document engine, at its interface boundary.
#[async_trait]
pub trait RefreshEngine: Send + Sync {
    /// Probe whether the document is held open exclusively by another
    /// process.
    fn is_locked(&self, path: &Path) -> bool;

    /// Launch/attach the engine non-interactively, alerts suppressed,
    /// and open the target document.
    async fn open(&self, path: &Path) -> Result<Box<dyn EngineSession>>;

    /// Row count of the active sheet in the persisted artifact, read
    /// without an engine session. Used for post-refresh validation.
    fn sheet_rows(&self, path: &Path) -> Result<u64>;
}

/// One engine session lifecycle over one open document.
#[async_trait]
pub trait EngineSession: Send {
    /// Force every data connection the document holds to complete
    /// synchronously, so that `refresh_all` blocks instead of returning
    /// before computation finishes.
    async fn disable_background_refresh(&mut self) -> Result<()>;

    /// Issue the engine's refresh-all operation.
    async fn refresh_all(&mut self) -> Result<()>;

    /// Whether the engine is still calculating.
    async fn is_busy(&mut self) -> Result<bool>;

    /// Persist the document and shut the engine down cleanly.
    async fn save_and_close(&mut self) -> Result<()>;

    /// Discard unsaved changes and kill the engine process. Never
    /// fails; secondary errors from cleanup are swallowed.
    async fn force_quit(&mut self);
}

/// Drives a headless document engine through configured host commands.
///
/// Each operation runs a command template with `{path}` substituted for
/// the target document. `is_busy` reports whether the refresh command is
/// still running.
pub struct ShellEngine {
    commands: EngineCommands,
}

impl ShellEngine {
    pub fn new(commands: EngineCommands) -> Result<Self> {
        if commands.launch.trim().is_empty() || commands.refresh.trim().is_empty() {
            return Err(RefreshdError::Config(
                "engine.commands.launch and engine.commands.refresh must be configured".into(),
            ));
        }
        Ok(Self { commands })
    }
}

#[async_trait]
impl RefreshEngine for ShellEngine {
    fn is_locked(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        match std::fs::OpenOptions::new().append(true).open(path) {
            Ok(_) => false,
            Err(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
        }
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn EngineSession>> {
        let app = build_command(&self.commands.launch, path)?
            .spawn()
            .map_err(|e| RefreshdError::Engine(format!("launch engine: {e}")))?;
        tracing::debug!("Engine launched for {}", path.display());
        Ok(Box::new(ShellSession {
            path: path.to_path_buf(),
            commands: self.commands.clone(),
            app: Some(app),
            refresh: None,
        }))
    }

    fn sheet_rows(&self, path: &Path) -> Result<u64> {
        let mut workbook = calamine::open_workbook_auto(path)
            .map_err(|e| RefreshdError::Validation(format!("cannot reopen artifact: {e}")))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| RefreshdError::Validation("artifact has no sheets".into()))?
            .map_err(|e| RefreshdError::Validation(format!("cannot read active sheet: {e}")))?;
        Ok(range.height() as u64)
    }
}

struct ShellSession {
    path: PathBuf,
    commands: EngineCommands,
    app: Option<Child>,
    refresh: Option<Child>,
}

#[async_trait]
impl EngineSession for ShellSession {
    async fn disable_background_refresh(&mut self) -> Result<()> {
        match &self.commands.tune {
            Some(template) => run_to_completion(template, &self.path).await,
            None => Ok(()),
        }
    }

    async fn refresh_all(&mut self) -> Result<()> {
        let child = build_command(&self.commands.refresh, &self.path)?
            .spawn()
            .map_err(|e| RefreshdError::Engine(format!("start refresh: {e}")))?;
        self.refresh = Some(child);
        Ok(())
    }

    async fn is_busy(&mut self) -> Result<bool> {
        let Some(child) = self.refresh.as_mut() else {
            return Ok(false);
        };
        match child
            .try_wait()
            .map_err(|e| RefreshdError::Engine(format!("poll refresh: {e}")))?
        {
            None => Ok(true),
            Some(status) if status.success() => Ok(false),
            Some(status) => Err(RefreshdError::Engine(format!(
                "refresh command exited with {status}"
            ))),
        }
    }

    async fn save_and_close(&mut self) -> Result<()> {
        if let Some(template) = &self.commands.save {
            run_to_completion(template, &self.path).await?;
        }
        // The engine process has no stdin protocol; once the document is
        // persisted, terminating it is the clean close.
        if let Some(mut app) = self.app.take() {
            app.start_kill().ok();
            app.wait().await.ok();
        }
        self.refresh = None;
        Ok(())
    }

    async fn force_quit(&mut self) {
        if let Some(mut child) = self.refresh.take() {
            child.start_kill().ok();
            child.wait().await.ok();
        }
        if let Some(mut app) = self.app.take() {
            app.start_kill().ok();
            app.wait().await.ok();
        }
    }
}

/// Split a command template on whitespace and substitute `{path}`.
fn build_command(template: &str, path: &Path) -> Result<Command> {
    let mut parts = template.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| RefreshdError::Config("empty engine command template".into()))?;
    let mut cmd = Command::new(program);
    for arg in parts {
        if arg == "{path}" {
            cmd.arg(path);
        } else {
            cmd.arg(arg);
        }
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd.kill_on_drop(true);
    Ok(cmd)
}

async fn run_to_completion(template: &str, path: &Path) -> Result<()> {
    let status = build_command(template, path)?
        .status()
        .await
        .map_err(|e| RefreshdError::Engine(format!("run '{template}': {e}")))?;
    if !status.success() {
        return Err(RefreshdError::Engine(format!(
            "'{template}' exited with {status}"
        )));
    }
    Ok(())
}
