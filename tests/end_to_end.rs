use std::{
    io::Write,
    path::Path,
    process::Command,
    sync::{Arc, Mutex},
};

use git_iterate::{
    config::YamlConfigSource,
    repository::HistoryOrder,
    run::{reporter::GraphiteReporter, run, RunError, RunOptions},
};

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str], date: Option<i64>) {
    let mut cmd = Command::new("git");
    cmd.args(["-c", "user.name=Test", "-c", "user.email=test@example.com", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir);
    if let Some(date) = date {
        let date = format!("{date} +0000");
        cmd.env("GIT_AUTHOR_DATE", &date).env("GIT_COMMITTER_DATE", &date);
    }
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
}

/// A repository whose `count.txt` has `n` lines at its `n`-th commit.
fn upstream(dir: &Path) -> String {
    let src = dir.join("upstream");
    std::fs::create_dir(&src).unwrap();
    git(&src, &["init", "-q"], None);
    git(&src, &["symbolic-ref", "HEAD", "refs/heads/master"], None);
    let mut content = String::new();
    for n in 1..=3 {
        content.push_str(&format!("line {n}\n"));
        std::fs::write(src.join("count.txt"), &content).unwrap();
        git(&src, &["add", "-A"], None);
        git(&src, &["commit", "-q", "-m", &format!("commit {n}")], Some(1_500_000_000 + n));
    }
    src.to_str().unwrap().to_string()
}

fn write_config(dir: &Path, url: &str) -> YamlConfigSource {
    let path = dir.join("conf.yml");
    std::fs::write(
        &path,
        format!(
            "repository: {url}\n\
             tasks:\n  \
               lines: wc -l < count.txt | tr -d ' '\n  \
               broken: echo FAIL; exit 1\n"
        ),
    )
    .unwrap();
    YamlConfigSource::new(path)
}

async fn run_once(config: &YamlConfigSource, options: &RunOptions) -> (Result<git_iterate::run::RunSummary, RunError>, Vec<String>) {
    let buffer = Buffer::default();
    let reporter = Arc::new(GraphiteReporter::new(buffer.clone()));
    let result = run(config, options, reporter, || true).await;
    (result, buffer.lines())
}

#[tokio::test]
async fn runs_every_task_on_every_commit() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let url = upstream(dir.path());
    let config = write_config(dir.path(), &url);
    let options = RunOptions {
        repository_dir: dir.path().join("repository"),
        threads: 2,
        ..Default::default()
    };

    let (summary, mut lines) = run_once(&config, &options).await;
    let summary = summary.unwrap();

    lines.sort();
    assert_eq!(lines, vec![
        "broken FAIL 1500000001",
        "broken FAIL 1500000002",
        "broken FAIL 1500000003",
        "lines 1 1500000001",
        "lines 2 1500000002",
        "lines 3 1500000003",
    ]);
    assert_eq!(summary.commits, 3);
    assert_eq!(summary.dispatched, 6);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.joins, 3);
    assert!(dir.path().join("repository/0/.git").is_dir());
    assert!(dir.path().join("repository/1/.git").is_dir());

    // mirrors are reused as they are
    std::fs::write(dir.path().join("repository/1/.git/marker"), "").unwrap();
    let (again, _) = run_once(&config, &options).await;
    again.unwrap();
    assert!(dir.path().join("repository/1/.git/marker").exists());
}

#[tokio::test]
async fn oldest_first_on_a_single_mirror_is_ordered() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let url = upstream(dir.path());
    let config = write_config(dir.path(), &url);
    let options = RunOptions {
        repository_dir: dir.path().join("repository"),
        threads: 1,
        order: HistoryOrder::OldestFirst,
        ..Default::default()
    };

    let (summary, lines) = run_once(&config, &options).await;
    summary.unwrap();

    assert_eq!(lines, vec![
        "lines 1 1500000001",
        "broken FAIL 1500000001",
        "lines 2 1500000002",
        "broken FAIL 1500000002",
        "lines 3 1500000003",
        "broken FAIL 1500000003",
    ]);
}

#[tokio::test]
async fn unreachable_repository_is_fatal() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let config = write_config(dir.path(), missing.to_str().unwrap());
    let options = RunOptions {
        repository_dir: dir.path().join("repository"),
        ..Default::default()
    };

    let (result, lines) = run_once(&config, &options).await;
    assert!(matches!(result, Err(RunError::MirrorSetup(_))));
    assert!(lines.is_empty());
}

#[tokio::test]
async fn empty_slots_inside_a_checkout_are_rebuilt() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let url = upstream(dir.path());
    let project = Path::new(&url);
    // the repository directory lives inside a checkout tracking the same remote
    git(project, &["remote", "add", "origin", &url], None);
    std::fs::create_dir_all(project.join("repository/0")).unwrap();
    std::fs::create_dir_all(project.join("repository/1")).unwrap();
    let head_before = std::fs::read_to_string(project.join(".git/HEAD")).unwrap();

    let config = write_config(dir.path(), &url);
    let options = RunOptions {
        repository_dir: project.join("repository"),
        threads: 2,
        ..Default::default()
    };
    let (summary, lines) = run_once(&config, &options).await;
    summary.unwrap();

    assert_eq!(lines.len(), 6);
    assert!(project.join("repository/0/.git").is_dir());
    assert!(project.join("repository/1/.git").is_dir());
    assert_eq!(std::fs::read_to_string(project.join(".git/HEAD")).unwrap(), head_before);
}
