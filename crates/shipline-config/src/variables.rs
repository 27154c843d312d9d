//! Variable interpolation for pipeline configurations.
//!
//! Supports variables like:
//! - `${git.sha}` - Full git commit SHA
//! - `${git.short_sha}` - Short (7 char) git commit SHA
//! - `${git.branch}` - Current branch name
//! - `${git.tag}` - Git tag (if applicable)
//! - `${git.ref}` - Git ref (branch or tag)
//! - `${pipeline.name}` - Pipeline name
//! - `${run.id}` - Run ID
//! - `${env.VAR_NAME}` - Environment variable
//! - `${secrets.SECRET_NAME}` - Secret value
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)
//! - `${datetime}` - ISO datetime
//!
//! Anything else, such as Maven's own `${project.version}`, is left as written.

use crate::{ConfigError, ConfigResult};
use regex::Regex;
use shipline_core::secret::SecretSet;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Git-related variables
    pub git: GitContext,
    pub pipeline_name: String,
    pub run_id: String,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Secrets (masked in logs)
    pub secrets: SecretSet,
}

/// Git context for variable interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitContext {
    pub sha: String,
    pub short_sha: String,
    /// Empty on a detached HEAD with no CI hint.
    pub branch: String,
    pub tag: Option<String>,
    pub ref_name: String,
}

impl GitContext {
    /// Inspect the repository at `repo_path`, then fill whatever git could not
    /// answer (detached HEAD, no repository) from CI environment variables.
    pub fn detect(repo_path: &Path) -> Self {
        let mut git = Self::from_repo(repo_path);
        git.fill_from_env();
        git
    }

    /// Populate git context by running git commands in a repo path.
    pub fn from_repo(repo_path: &Path) -> Self {
        let run_git = |args: &[&str]| -> Option<String> {
            Command::new("git")
                .args(args)
                .current_dir(repo_path)
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let mut git = GitContext::default();

        if let Some(sha) = run_git(&["rev-parse", "HEAD"]) {
            git.short_sha = sha.chars().take(7).collect();
            git.sha = sha;
        }

        if let Some(branch) = run_git(&["rev-parse", "--abbrev-ref", "HEAD"]) {
            if branch != "HEAD" {
                git.ref_name = branch.clone();
                git.branch = branch;
            }
        }

        if let Some(tag) = run_git(&["describe", "--tags", "--exact-match", "HEAD"]) {
            git.ref_name = tag.clone();
            git.tag = Some(tag);
        }

        git
    }

    /// Populate empty fields from common CI environment variables.
    pub fn fill_from_env(&mut self) {
        self.fill_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn fill_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| names.iter().find_map(|n| var(*n));

        if self.sha.is_empty() {
            if let Some(sha) = first(&[
                "SHIPLINE_COMMIT_SHA",
                "GIT_COMMIT",
                "GITHUB_SHA",
                "CI_COMMIT_SHA",
            ]) {
                self.short_sha = sha.chars().take(7).collect();
                self.sha = sha;
            }
        }

        if self.branch.is_empty() {
            let github_branch = var("GITHUB_REF_TYPE")
                .filter(|t| t == "branch")
                .and_then(|_| var("GITHUB_REF_NAME"));
            if let Some(branch) = first(&["SHIPLINE_BRANCH", "GIT_BRANCH", "CI_COMMIT_BRANCH"])
                .or(github_branch)
            {
                self.branch = branch;
            }
        }

        if self.tag.is_none() {
            self.tag = first(&["SHIPLINE_TAG", "CI_COMMIT_TAG"]).or_else(|| {
                var("GITHUB_REF_TYPE")
                    .filter(|t| t == "tag")
                    .and_then(|_| var("GITHUB_REF_NAME"))
            });
        }

        if self.ref_name.is_empty() {
            self.ref_name = self.tag.clone().unwrap_or_else(|| self.branch.clone());
        }
    }

    pub fn branch(&self) -> Option<&str> {
        Some(self.branch.as_str()).filter(|b| !b.is_empty())
    }
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Namespaces that must resolve under strict interpolation.
const STRICT_NAMESPACES: &[&str] = &["git", "pipeline", "run", "env", "secrets"];

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["git", "sha"] => Some(self.git.sha.clone()).filter(|s| !s.is_empty()),
            ["git", "short_sha"] => Some(self.git.short_sha.clone()).filter(|s| !s.is_empty()),
            ["git", "branch"] => self.git.branch().map(str::to_string),
            ["git", "tag"] => self.git.tag.clone(),
            ["git", "ref"] => Some(self.git.ref_name.clone()).filter(|s| !s.is_empty()),

            ["pipeline", "name"] => Some(self.pipeline_name.clone()),
            ["run", "id"] => Some(self.run_id.clone()).filter(|s| !s.is_empty()),

            ["env", name] => self.env.get(*name).cloned(),
            ["secrets", name] => self.secrets.get(name).map(str::to_string),

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            ["datetime"] => Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Variables are specified as `${var_name}` or `${namespace.var_name}`.
    /// Unknown variables are preserved.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Like [`interpolate`](Self::interpolate), but a variable in one of the
    /// known namespaces that has no value is an error.
    pub fn try_interpolate(&self, input: &str) -> ConfigResult<String> {
        for caps in VAR_REGEX.captures_iter(input) {
            let var_name = &caps[1];
            let namespace = var_name.split('.').next().unwrap_or_default();
            if STRICT_NAMESPACES.contains(&namespace) && self.resolve(var_name).is_none() {
                return Err(ConfigError::UnresolvedVariable(var_name.to_string()));
            }
        }
        Ok(self.interpolate(input))
    }

    /// Strictly interpolate variables in a list of strings.
    pub fn try_interpolate_vec(&self, inputs: &[String]) -> ConfigResult<Vec<String>> {
        inputs.iter().map(|s| self.try_interpolate(s)).collect()
    }

    /// Strictly interpolate the values of a map.
    pub fn try_interpolate_map(
        &self,
        map: &HashMap<String, String>,
    ) -> ConfigResult<HashMap<String, String>> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.try_interpolate(v)?)))
            .collect()
    }

    /// Get a list of all secret variable names used in a string (for masking).
    pub fn find_secrets_in_string(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .filter_map(|caps| {
                let var_name = &caps[1];
                if var_name.starts_with("secrets.") {
                    Some(var_name.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_git(mut self, git: GitContext) -> Self {
        self.ctx.git = git;
        self
    }

    pub fn with_git_sha(mut self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        self.ctx.git.short_sha = sha.chars().take(7).collect();
        self.ctx.git.sha = sha;
        self
    }

    pub fn with_git_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        if self.ctx.git.ref_name.is_empty() {
            self.ctx.git.ref_name = branch.clone();
        }
        self.ctx.git.branch = branch;
        self
    }

    pub fn with_pipeline(mut self, name: impl Into<String>) -> Self {
        self.ctx.pipeline_name = name.into();
        self
    }

    pub fn with_run(mut self, id: impl Into<String>) -> Self {
        self.ctx.run_id = id.into();
        self
    }

    pub fn with_process_env(mut self) -> Self {
        self.ctx.populate_env();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_secrets(mut self, secrets: SecretSet) -> Self {
        self.ctx.secrets = secrets;
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.secrets.insert(key, value);
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
