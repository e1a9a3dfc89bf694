use std::path::Path;

use crate::{
    repository::{GitError, HistoryOrder, RepositoryGateway},
    run::execution::{ShellExecutor, TaskFailure},
};

/// [`RepositoryGateway`] backed by the `git` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli {
    shell: ShellExecutor,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs git inside `path`, or in the current directory when `None`.
    ///
    /// `path` must be the top of a working copy. Git would otherwise walk up
    /// and act on whatever repository encloses it.
    fn git(&self, path: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
        let command = std::iter::once("git")
            .chain(args.iter().copied())
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ");
        let result = match path {
            Some(path) if !path.join(".git").exists() => {
                return Err(GitError {
                    output: format!("{} is not a git working copy", path.display()),
                    command,
                });
            }
            Some(path) => self.shell.run_in_directory(path, &command),
            None => self.shell.run(&command),
        };
        result.map_err(|failure| git_error(command, failure))
    }
}

impl RepositoryGateway for GitCli {
    fn remote_url(&self, path: &Path) -> Result<String, GitError> {
        Ok(self.git(Some(path), &["config", "--get", "remote.origin.url"])?.trim().to_string())
    }

    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), GitError> {
        let Some(dest) = path.to_str() else {
            return Err(GitError {
                command: format!("git clone {url}"),
                output: format!("non UTF-8 destination {}", path.display()),
            });
        };
        self.git(None, &["clone", "--quiet", url, dest])?;
        Ok(())
    }

    fn commit_list(&self, path: &Path, branch: &str, order: HistoryOrder) -> Result<Vec<String>, GitError> {
        let mut args = vec!["rev-list"];
        if order == HistoryOrder::OldestFirst {
            args.push("--reverse");
        }
        args.push(branch);
        args.push("--");
        let out = self.git(Some(path), &args)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn checkout(&self, path: &Path, commit: &str) -> Result<(), GitError> {
        self.git(Some(path), &["checkout", "--quiet", "--force", "--detach", commit])?;
        Ok(())
    }

    fn commit_timestamp(&self, path: &Path, commit: &str) -> Result<i64, GitError> {
        let out = self.git(Some(path), &["show", "--no-patch", "--format=%at", commit])?;
        out.trim().parse().map_err(|e| GitError {
            command: format!("git show --no-patch --format=%at {commit}"),
            output: format!("unexpected timestamp {out:?}: {e}"),
        })
    }
}

fn quote(arg: &str) -> String {
    shlex::try_quote(arg)
        .map(|q| q.into_owned())
        // only fails on NUL bytes, which git would reject anyway
        .unwrap_or_else(|_| arg.replace('\0', ""))
}

fn git_error(command: String, failure: TaskFailure) -> GitError {
    let output = match failure {
        TaskFailure::Exit { output, .. } if !output.is_empty() => output,
        other => other.to_string(),
    };
    GitError { command, output }
}
