//! Test fixtures: a loopback HTTP server, archive builders and local git remotes.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Minimal HTTP/1.1 server answering canned responses by request path.
///
/// Every connection is closed after one response. The accept loop runs on a
/// detached thread for the rest of the test process.
pub struct HttpFixture {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpFixture {
    pub fn serve(routes: Vec<(&str, u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let routes: HashMap<String, (u16, Vec<u8>)> = routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body)))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) => break,
                        Ok(_) if header == "\r\n" || header == "\n" => break,
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }

                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(path.clone());

                let (status, body) = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, b"not found".to_vec()));
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Error",
                };
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    reason,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Paths requested so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Builds a gzip tarball containing `files` (path, contents).
pub fn crate_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let builder = tar_with(encoder, files);
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Builds an uncompressed tarball containing `files` (path, contents).
pub fn plain_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    tar_with(Vec::new(), files)
        .into_inner()
        .expect("finish tar")
}

fn tar_with<W: Write>(writer: W, files: &[(&str, &str)]) -> tar::Builder<W> {
    let mut builder = tar::Builder::new(writer);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("append tar entry");
    }
    builder
}

/// Writes `files` under `root`, creating parent directories.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, contents).unwrap();
    }
}

/// Relative paths of every regular file under `root`, skipping `.git`.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Creates an empty bare repository to act as the push remote.
pub fn bare_remote(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let status = Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(dir)
        .status()
        .expect("run git init --bare");
    assert!(status.success(), "git init --bare failed");
    dir.to_path_buf()
}

/// Number of commits reachable from `refs/heads/{branch}` in `repo`.
pub fn commit_count(repo: &Path, branch: &str) -> usize {
    let repo = git2::Repository::open(repo).unwrap();
    let Ok(reference) = repo.find_reference(&format!("refs/heads/{}", branch)) else {
        return 0;
    };
    let mut walk = repo.revwalk().unwrap();
    walk.push(reference.target().unwrap()).unwrap();
    walk.count()
}

/// Tag names present in `repo`.
pub fn tag_names(repo: &Path) -> Vec<String> {
    let repo = git2::Repository::open(repo).unwrap();
    let tags = repo.tag_names(None).unwrap();
    let mut names: Vec<String> = tags.iter().flatten().map(String::from).collect();
    names.sort();
    names
}

/// Paths of every blob in the tree of `refs/heads/{branch}`, sorted.
pub fn branch_files(repo: &Path, branch: &str) -> Vec<String> {
    let repo = git2::Repository::open(repo).unwrap();
    let tree = repo
        .find_reference(&format!("refs/heads/{}", branch))
        .unwrap()
        .peel_to_tree()
        .unwrap();
    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            files.push(format!("{}{}", dir, entry.name().unwrap_or_default()));
        }
        git2::TreeWalkResult::Ok
    })
    .unwrap();
    files.sort();
    files
}

/// Message of the commit at `refs/heads/{branch}` in `repo`.
pub fn head_message(repo: &Path, branch: &str) -> String {
    let repo = git2::Repository::open(repo).unwrap();
    let reference = repo
        .find_reference(&format!("refs/heads/{}", branch))
        .unwrap();
    let commit = reference.peel_to_commit().unwrap();
    commit.message().unwrap_or_default().to_string()
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    listener.local_addr().expect("local addr").port()
}
