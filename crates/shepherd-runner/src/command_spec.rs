use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

// ============================================================================
// CommandSpec - Immutable Description of a Process to Launch
// ============================================================================

/// Separator between parts in [`CommandSpec::render_multiline`].
const LINE_CONTINUATION: &str = " \\\n";

static HERE_DOC_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<(\w[-\w]*)\s*").unwrap());

/// Specification for a command to execute.
///
/// Arguments are kept as discrete elements. When the spec has no redirects
/// it is spawned argv-style via [`CommandSpec::to_command`] with no shell
/// involved; redirects only make sense to a shell, so a spec carrying them
/// is materialized into a script by the launcher.
///
/// # Example
///
/// ```rust
/// use shepherd_runner::CommandSpec;
///
/// let cmd = CommandSpec::new("qemu-img")
///     .args(["info", "disk image.raw"])
///     .redirect("2>&1")
///     .cwd("/var/images");
///
/// assert_eq!(cmd.render(), "2>&1 qemu-img info 'disk image.raw'");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Shell redirection tokens, rendered before the program in this order
    pub redirects: Vec<String>,
    /// Environment overrides
    pub env: BTreeMap<String, String>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// The program to execute
    pub program: String,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a shell redirection token such as `2>&1` or `>out.txt`.
    #[must_use]
    pub fn redirect(mut self, token: impl Into<String>) -> Self {
        self.redirects.push(token.into());
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Whether the spec can only be executed by a shell.
    #[must_use]
    pub fn needs_shell(&self) -> bool {
        !self.redirects.is_empty()
    }

    /// Single-line shell form: redirects, then the quoted program and arguments.
    #[must_use]
    pub fn render(&self) -> String {
        fix_here_docs(&self.quoted_parts().join(" "))
    }

    /// One part per line, joined by escaped line continuations.
    #[must_use]
    pub fn render_multiline(&self) -> String {
        let parts: Vec<String> = self
            .quoted_parts()
            .into_iter()
            .map(|part| part.trim().to_string())
            .collect();
        fix_here_docs(&parts.join(LINE_CONTINUATION))
    }

    /// Tokens of this command that name existing files or directories.
    ///
    /// Relative tokens are resolved against the working directory if one is
    /// set. Tokens that do not resolve are skipped.
    #[must_use]
    pub fn referenced_paths(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        let tokens = self
            .redirects
            .iter()
            .chain(std::iter::once(&self.program))
            .chain(&self.args);
        for token in tokens {
            let unquoted = token.trim_matches(['"', '\'']);
            if unquoted.is_empty() {
                continue;
            }
            let candidate = match (&self.cwd, Path::new(unquoted)) {
                (Some(cwd), path) if path.is_relative() => cwd.join(path),
                (_, path) => path.to_path_buf(),
            };
            if candidate.exists() && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
        found
    }

    /// Build an argv-style `std::process::Command`. Redirects are ignored.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.env);

        cmd
    }

    fn quoted_parts(&self) -> Vec<String> {
        self.redirects
            .iter()
            .cloned()
            .chain(
                std::iter::once(&self.program)
                    .chain(&self.args)
                    .map(|part| shell_words::quote(part).into_owned()),
            )
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Remove the quotes that argument quoting put around embedded here-documents.
///
/// A here-document only works if `<<NAME` and the closing `NAME` line reach
/// the shell verbatim.
fn fix_here_docs(rendered: &str) -> String {
    let mut names: Vec<&str> = HERE_DOC_NAME
        .captures_iter(rendered)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    names.dedup();

    let mut fixed = rendered.to_string();
    for name in names {
        let name = regex::escape(name);
        let Ok(block) = Regex::new(&format!(r#"(?ms)["']+<<{name}.*^{name}["']+"#)) else {
            continue;
        };
        fixed = block
            .replace_all(&fixed, |caps: &Captures<'_>| unquote_here_doc(&caps[0]))
            .into_owned();
    }
    fixed
}

/// Undo single-quote quoting of a here-document, including the `'\''`
/// escapes of apostrophes in its body.
fn unquote_here_doc(quoted: &str) -> String {
    let inner = quoted.strip_prefix('\'').unwrap_or(quoted);
    let inner = inner.strip_suffix('\'').unwrap_or(inner);
    inner.replace(r"'\''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_new() {
        let cmd = CommandSpec::new("guestfish");
        assert_eq!(cmd.program, "guestfish");
        assert!(cmd.args.is_empty());
        assert!(cmd.redirects.is_empty());
        assert!(cmd.cwd.is_none());
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn test_command_spec_builder_chain() {
        let cmd = CommandSpec::new("docker")
            .arg("run")
            .args(["--rm", "busybox"])
            .redirect("2>&1")
            .cwd("/workspace")
            .env("DEBUG", "1")
            .envs([("VERBOSE", "true")]);

        assert_eq!(cmd.args, vec!["run", "--rm", "busybox"]);
        assert_eq!(cmd.redirects, vec!["2>&1"]);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/workspace")));
        assert_eq!(cmd.env.len(), 2);
        assert!(cmd.needs_shell());
    }

    #[test]
    fn test_render_quotes_arguments() {
        let cmd = CommandSpec::new("echo").args(["hello world", "$HOME", "plain"]);
        assert_eq!(cmd.render(), "echo 'hello world' '$HOME' plain");
        assert_eq!(cmd.to_string(), cmd.render());
    }

    #[test]
    fn test_render_puts_redirects_first() {
        let cmd = CommandSpec::new("ls").redirect(">out.txt").redirect("2>&1");
        assert_eq!(cmd.render(), ">out.txt 2>&1 ls");
    }

    #[test]
    fn test_render_is_deterministic() {
        let cmd = CommandSpec::new("env").envs([("B", "2"), ("A", "1")]).arg("x");
        assert_eq!(cmd.render(), cmd.clone().render());
        assert_eq!(cmd.render_multiline(), cmd.render_multiline());
    }

    #[test]
    fn test_render_multiline() {
        let cmd = CommandSpec::new("virt-customize").args(["-a", "disk.img", "--run-command", "echo hi"]);
        assert_eq!(
            cmd.render_multiline(),
            "virt-customize \\\n-a \\\ndisk.img \\\n--run-command \\\n'echo hi'"
        );
    }

    #[test]
    fn test_here_doc_survives_rendering() {
        let cmd = CommandSpec::new("cat").arg("<<EOF\nline one\nline two\nEOF");
        assert_eq!(cmd.render(), "cat <<EOF\nline one\nline two\nEOF");
        assert_eq!(cmd.render_multiline(), "cat \\\n<<EOF\nline one\nline two\nEOF");
    }

    #[test]
    fn test_here_doc_body_keeps_apostrophes() {
        let cmd = CommandSpec::new("cat").arg("<<EOF\nit's done\nEOF");
        assert_eq!(cmd.render(), "cat <<EOF\nit's done\nEOF");
        assert_eq!(cmd.render_multiline(), "cat \\\n<<EOF\nit's done\nEOF");
    }

    #[test]
    fn test_here_doc_with_dashed_name() {
        let cmd = CommandSpec::new("sh").arg("<<END-OF-SCRIPT\necho $X\nEND-OF-SCRIPT");
        assert_eq!(cmd.render(), "sh <<END-OF-SCRIPT\necho $X\nEND-OF-SCRIPT");
    }

    #[test]
    fn test_referenced_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("disk.img"), b"").unwrap();
        let absolute = dir.path().join("disk.img");

        let cmd = CommandSpec::new("qemu-img")
            .args(["info", "disk.img", "missing.img"])
            .arg(format!("'{}'", absolute.display()))
            .cwd(dir.path());

        assert_eq!(cmd.referenced_paths(), vec![absolute]);
    }

    #[test]
    fn test_referenced_paths_without_matches() {
        let cmd = CommandSpec::new("definitely-not-a-file-xyz").arg("--flag");
        assert!(cmd.referenced_paths().is_empty());
    }

    #[test]
    fn test_command_spec_shell_metacharacters_preserved() {
        let cmd = CommandSpec::new("echo")
            .arg("$(whoami)")
            .arg("`id`")
            .arg("${HOME}");

        assert_eq!(cmd.args, vec!["$(whoami)", "`id`", "${HOME}"]);
        let std_cmd = cmd.to_command();
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["$(whoami)", "`id`", "${HOME}"]);
    }

    #[test]
    fn test_to_command_applies_cwd_and_env() {
        let cmd = CommandSpec::new("printenv").cwd("/tmp").env("SHEPHERD_TEST", "1");
        let std_cmd = cmd.to_command();
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/tmp")));
        let envs: Vec<_> = std_cmd.get_envs().collect();
        assert_eq!(envs.len(), 1);
    }
}
