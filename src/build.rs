//! Building databases from scratch
//!
//! The expensive path: run an external initializer (e.g. `odoo --init`) that
//! creates the target database and installs the recipe's modules. The cache
//! only cares whether it succeeded.

use crate::cache::Recipe;
use crate::config::schema::BuildConfig;
use crate::error::{PgstampError, PgstampResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Creates and fully initializes a database for a recipe
#[async_trait]
pub trait TemplateBuilder: Send + Sync {
    /// Create `target` and populate it according to `recipe`
    async fn build(&self, target: &str, recipe: &Recipe) -> PgstampResult<()>;
}

/// Builder that runs a configured command
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: BuildConfig,
}

impl CommandBuilder {
    /// Create a builder from build settings
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Expand the command template for one build
    pub fn argv(&self, target: &str, recipe: &Recipe) -> Vec<String> {
        let modules = recipe.modules().collect::<Vec<_>>().join(",");
        let demo = recipe.demo().to_string();

        let extra = if recipe.demo() {
            &self.config.demo_args
        } else {
            &self.config.no_demo_args
        };

        self.config
            .command
            .iter()
            .chain(extra)
            .map(|arg| {
                arg.replace("{database}", target)
                    .replace("{modules}", &modules)
                    .replace("{demo}", &demo)
            })
            .collect()
    }
}

#[async_trait]
impl TemplateBuilder for CommandBuilder {
    async fn build(&self, target: &str, recipe: &Recipe) -> PgstampResult<()> {
        let argv = self.argv(target, recipe);
        let Some((program, args)) = argv.split_first() else {
            return Err(PgstampError::User("build.command must not be empty".to_string()));
        };

        info!("Building {} with {}", target, program);
        debug!("Executing: {:?}", argv);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PgstampError::command_failed(program.clone(), e))?;

        let output = stream_child_output(&mut child, &|line: &str| debug!("[build] {}", line)).await;

        let status = child
            .wait()
            .await
            .map_err(|e| PgstampError::command_failed(program.clone(), e))?;

        if status.success() {
            Ok(())
        } else {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(PgstampError::Build {
                database: target.to_string(),
                reason: format!("{} exited with {}\n{}", program, code, error_tail(&output)),
            })
        }
    }
}

/// Extract the useful tail of build output for error diagnostics.
fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
