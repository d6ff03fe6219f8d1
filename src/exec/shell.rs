// src/exec/shell.rs

//! Recipe scripts: quoting, automatic variables and the subprocess runner.

use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::fragment::ANONYMOUS;
use crate::tree::BoxFuture;
use crate::types::Bindings;

/// Single-quote `s` for `sh`.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Replace `$@`, `$<` and `$*` with quoted values. A backslash in front of
/// the dollar keeps the sequence as written.
pub fn contextify(script: &str, target: &str, deps: &[String]) -> String {
    let mut out = String::with_capacity(script.len());
    let mut chars = script.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(c);
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('@') => {
                chars.next();
                out.push_str(&quote(target));
            }
            Some('<') => {
                chars.next();
                out.push_str(&quote(deps.first().map(String::as_str).unwrap_or("")));
            }
            Some('*') => {
                chars.next();
                let all: Vec<String> = deps.iter().map(|d| quote(d)).collect();
                out.push_str(&all.join(" "));
            }
            _ => out.push('$'),
        }
    }
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Shell variables for every binding that has a valid identifier name.
pub fn variables(bindings: &Bindings) -> Vec<(String, String)> {
    bindings
        .iter()
        .filter(|(name, _)| *name != ANONYMOUS && is_identifier(name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// `set -- deps...` plus one assignment per binding.
pub fn prologue(deps: &[String], bindings: &Bindings) -> String {
    render_prologue(deps, &variables(bindings))
}

fn render_prologue(args: &[String], vars: &[(String, String)]) -> String {
    let mut out = String::from("set --");
    for arg in args {
        out.push(' ');
        out.push_str(&quote(arg));
    }
    out.push('\n');
    for (name, value) in vars {
        out.push_str(&format!("{name}={}\n", quote(value)));
    }
    out
}

/// One script to run for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    /// Node id, used to tag output lines.
    pub label: String,
    /// Script body with automatic variables already substituted.
    pub script: String,
    pub variables: Vec<(String, String)>,
    /// Positional parameters (the resolved dependencies).
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ScriptInvocation {
    /// Full text handed to the shell.
    pub fn full_script(&self) -> String {
        render_prologue(&self.args, &self.variables) + &self.script
    }
}

/// Seam between the execution engine and subprocesses.
pub trait ScriptRunner: Send + Sync + Debug {
    /// Run the script and return its exit code.
    fn run(&self, invocation: ScriptInvocation) -> BoxFuture<'static, Result<i32>>;
}

/// Runs scripts through `<shell> -c`, logging stdout at info and stderr at
/// warn.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ScriptRunner for ShellRunner {
    fn run(&self, invocation: ScriptInvocation) -> BoxFuture<'static, Result<i32>> {
        let shell = self.shell.clone();
        Box::pin(async move { run_script(&shell, invocation).await })
    }
}

async fn run_script(shell: &str, invocation: ScriptInvocation) -> Result<i32> {
    let node = invocation.label.clone();
    info!(node = %node, script = %invocation.script, "running recipe");

    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(invocation.full_script())
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning shell for '{node}'"))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = stdout.map(|stdout| {
        let node = node.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(node = %node, "{}", line);
            }
        })
    });
    let err_task = stderr.map(|stderr| {
        let node = node.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(node = %node, "{}", line);
            }
        })
    });

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for recipe of '{node}'"))?;

    // drain remaining output before reporting
    for task in [out_task, err_task].into_iter().flatten() {
        let _ = task.await;
    }

    let code = status.code().unwrap_or(-1);
    debug!(node = %node, exit_code = code, success = status.success(), "recipe exited");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_survives_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn contextify_quotes_automatic_variables() {
        let deps = vec!["a b.c".to_string(), "d.c".to_string()];
        assert_eq!(
            contextify("cc $* -o $@ # $<", "out", &deps),
            "cc 'a b.c' 'd.c' -o 'out' # 'a b.c'"
        );
        assert_eq!(contextify(r"echo \$@ $HOME", "out", &deps), r"echo \$@ $HOME");
    }

    #[test]
    fn prologue_skips_anonymous_and_invalid_names() {
        let mut b = Bindings::new();
        b.insert_text("_", "x");
        b.insert_text("stem", "main");
        b.insert_text("bad-name", "y");
        assert_eq!(prologue(&["src/a".into()], &b), "set -- 'src/a'\nstem='main'\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_reports_exit_code_and_sees_variables() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::default();
        let inv = ScriptInvocation {
            label: "t".into(),
            script: r#"test "$stem" = main && test "$1" = dep && echo ok > out"#.into(),
            variables: vec![("stem".into(), "main".into())],
            args: vec!["dep".into()],
            cwd: dir.path().to_path_buf(),
        };
        assert_eq!(runner.run(inv.clone()).await.unwrap(), 0);
        assert!(dir.path().join("out").exists());

        let failing = ScriptInvocation {
            script: "exit 3".into(),
            ..inv
        };
        assert_eq!(runner.run(failing).await.unwrap(), 3);
    }
}
