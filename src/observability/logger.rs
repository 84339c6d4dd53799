//! Markdown interaction log for agent runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Run logger.
///
/// Writes a markdown transcript of every run handled by an executor: the
/// command that started it, each step, model responses, tool executions,
/// errors and the final outcome. Console output goes through `tracing`.
#[derive(Debug)]
pub struct Logger {
    log_file: PathBuf,
    log_level: String,
}

impl Logger {
    /// Initialize logger.
    ///
    /// # Arguments
    /// * `log_file` - Path to log file. If None, creates a timestamped file in temp directory.
    /// * `log_level` - Logging level (defaults to "INFO").
    pub fn new(log_file: Option<&Path>, log_level: Option<&str>) -> Result<Self> {
        let log_file = match log_file {
            Some(p) => p.to_path_buf(),
            None => {
                let mut dir = std::env::temp_dir();
                dir.push("ouds-logs");
                std::fs::create_dir_all(&dir).with_context(|| {
                    format!("Failed to create log directory: {}", dir.display())
                })?;
                let filename = format!(
                    "run_{}_{}.md",
                    Utc::now().timestamp_millis(),
                    std::process::id()
                );
                dir.join(filename)
            }
        };

        let log_level = log_level.unwrap_or("INFO").to_uppercase();

        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        let logger = Self {
            log_file,
            log_level,
        };

        if !logger.log_file.exists() {
            logger.initialize_log_file()?;
        }

        Ok(logger)
    }

    fn initialize_log_file(&self) -> Result<()> {
        let mut file = File::create(&self.log_file)
            .with_context(|| format!("Failed to create log file: {}", self.log_file.display()))?;

        let now: DateTime<Utc> = Utc::now();

        writeln!(file, "# Agent Run Log\n")?;
        writeln!(file, "Log started: {}\n", now.to_rfc3339())?;
        writeln!(file, "---\n")?;

        Ok(())
    }

    fn append_to_log(&self, content: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("Failed to open log file: {}", self.log_file.display()))?;

        write!(file, "{}", content).with_context(|| "Failed to write to log file")?;

        Ok(())
    }

    fn is_debug(&self) -> bool {
        self.log_level == "DEBUG" || self.log_level == "TRACE"
    }

    /// Log the start of a run.
    ///
    /// # Arguments
    /// * `workspace_id` - Workspace the command runs in.
    /// * `command` - Text of the command being executed.
    /// * `details` - Extra key/value details (provider, max steps, ...).
    pub fn log_run_start(
        &self,
        workspace_id: &str,
        command: &str,
        details: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let content = format!(
            "## Run Started - {}\n\n**Workspace:** {}\n**Command:** {}\n**Details:** {}\n\n",
            now.to_rfc3339(),
            workspace_id,
            command,
            serde_json::to_string_pretty(details).unwrap_or_default()
        );

        self.append_to_log(&content)?;
        tracing::debug!(workspace_id, "run log started");
        Ok(())
    }

    /// Log the start of one think/act step.
    pub fn log_step(&self, step: u32, max_steps: u32) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let content = format!(
            "## Step {}/{}\n\n**Timestamp:** {}\n\n",
            step,
            max_steps,
            now.to_rfc3339()
        );

        self.append_to_log(&content)
    }

    /// Log a model response.
    ///
    /// Empty responses are skipped. Messages are only dumped at DEBUG level.
    pub fn log_llm_response(
        &self,
        provider: &str,
        response: &str,
        message_count: usize,
    ) -> Result<()> {
        if response.trim().is_empty() {
            return Ok(());
        }

        let now: DateTime<Utc> = Utc::now();
        let messages_block = if self.is_debug() {
            format!("**Messages:** {} messages\n\n", message_count)
        } else {
            String::new()
        };

        let content = format!(
            "### LLM Response - {}\n\n**Provider:** {}\n\n{}**Response:**\n```\n{}\n```\n\n",
            now.to_rfc3339(),
            provider,
            messages_block,
            response
        );

        self.append_to_log(&content)
    }

    /// Log tool execution with its result.
    pub fn log_tool_execution(
        &self,
        tool_name: &str,
        tool_args: &str,
        result: &str,
        success: bool,
    ) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let status = if success { "Result" } else { "Error" };

        let content = format!(
            "### Tool Execution - {}\n\n**Tool:** {}\n**Args:** {}\n**{}:** {}\n\n",
            now.to_rfc3339(),
            tool_name,
            tool_args,
            status,
            result
        );

        self.append_to_log(&content)
    }

    /// Log error with context.
    pub fn log_error(
        &self,
        error: &str,
        context: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let mut content = format!("### Error - {}\n\n**Error:** {}\n\n", now.to_rfc3339(), error);

        if let Some(ctx) = context {
            content.push_str(&format!(
                "**Context:** {}\n\n",
                serde_json::to_string_pretty(ctx).unwrap_or_default()
            ));
        }

        self.append_to_log(&content)
    }

    /// Log run completion.
    ///
    /// # Arguments
    /// * `state` - Terminal executor state.
    /// * `output` - Final output of the run.
    pub fn log_completion(&self, state: &str, output: &str) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let content = format!(
            "### Run Completed - {}\n\n**State:** {}\n**Output:** {}\n\n---\n\n",
            now.to_rfc3339(),
            state,
            output
        );

        self.append_to_log(&content)
    }

    /// Get the log file path.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Get the log level.
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}
