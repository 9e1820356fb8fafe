//! Small remote-shell helpers: existence checks, removal, directory creation,
//! file info and file listing.
//!
//! Existence and removal cost one ssh invocation per file. Directory creation,
//! file info and listing are batched into a single invocation each.

use std::path::{Path, PathBuf};

use crate::command::{self, Tools};
use crate::error::{Result, SyncError};
use crate::location::FileInfo;
use crate::location::listing::SearchKind;

const INFO_START: &str = "===INFO_START===";
const INFO_END: &str = "===INFO_END===";
const LIST_START: &str = "===LIST_START===";
const LIST_END: &str = "===LIST_END===";

/// Computes size, mtime and sha256 for each path read from stdin, one line of
/// output per input path, in order. Works with GNU and BSD userlands.
const INFO_SCRIPT: &str = r#"
if command -v sha256sum >/dev/null 2>&1; then
    hash() { sha256sum "$1" | cut -d' ' -f1; }
else
    hash() { shasum -a 256 "$1" | cut -d' ' -f1; }
fi
stamp() { stat -c '%s %Y' "$1" 2>/dev/null || stat -f '%z %m' "$1"; }
echo "===INFO_START==="
while IFS= read -r path; do
    if [ -f "$path" ]; then
        set -- $(stamp "$path")
        printf 'OK\t%s\t%s\t%s\n' "$1" "$2" "$(hash "$path")"
    else
        printf 'MISSING\n'
    fi
done <<'__LOCSYNC_PATHS__'
"#;

const PATHS_END: &str = "__LOCSYNC_PATHS__";

/// `test -f` on the remote host. Exit 1 means absent; anything else but 0 is
/// a connection or shell failure.
pub fn file_exists(tools: &Tools, host: &str, path: &Path) -> Result<bool> {
    let path = path.to_string_lossy();
    let mut cmd = tools.ssh_command(host, &["test", "-f", &path]);
    let output = command::capture(&mut cmd, None)?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        status => Err(command::subprocess_error(&cmd, status, &output.stderr)),
    }
}

/// `rm -f` a single file on the remote host.
pub fn remove_file(tools: &Tools, host: &str, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    let mut cmd = tools.ssh_command(host, &["rm", "-f", &path]);
    command::run(&mut cmd)?;
    Ok(())
}

/// `mkdir -p` all `dirs` in one invocation. Callers pass the deepest
/// directories only.
pub fn make_dirs(tools: &Tools, host: &str, dirs: &[PathBuf]) -> Result<()> {
    if dirs.is_empty() {
        return Ok(());
    }
    let dirs: Vec<String> = dirs.iter().map(|d| d.to_string_lossy().into_owned()).collect();
    let mut args = vec!["mkdir", "-p"];
    args.extend(dirs.iter().map(String::as_str));
    let mut cmd = tools.ssh_command(host, &args);
    command::run(&mut cmd)?;
    tracing::debug!(host, dirs = dirs.len(), "created remote directories");
    Ok(())
}

/// Info for `paths` (relative to `root`) on `host`. `None` marks a path that
/// is not a regular file there.
pub fn compute_info(
    tools: &Tools,
    host: &str,
    root: &Path,
    paths: &[PathBuf],
) -> Result<Vec<Option<FileInfo>>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let mut script = String::new();
    if !root.as_os_str().is_empty() {
        script.push_str(&format!(
            "cd {} || exit 3\n",
            shell_words::quote(&root.to_string_lossy())
        ));
    }
    script.push_str(INFO_SCRIPT);
    for path in paths {
        let line = path.to_string_lossy();
        if line.contains('\n') || line == PATHS_END {
            return Err(SyncError::manifest(format!(
                "path {line:?} cannot be sent to a remote shell"
            )));
        }
        script.push_str(&line);
        script.push('\n');
    }
    script.push_str(PATHS_END);
    script.push('\n');
    script.push_str(&format!("echo \"{INFO_END}\"\n"));

    let mut cmd = tools.ssh_command(host, &["bash", "-s"]);
    let output = command::run_with_input(&mut cmd, &script)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let infos = parse_info_output(&stdout)?;
    if infos.len() != paths.len() {
        return Err(SyncError::UnparseableOutput {
            tool: "ssh".into(),
            line: format!("expected {} info lines, got {}", paths.len(), infos.len()),
        });
    }
    Ok(infos)
}

/// Contents of a remote file.
pub fn read_file(tools: &Tools, host: &str, path: &Path) -> Result<String> {
    let path = path.to_string_lossy();
    let mut cmd = tools.ssh_command(host, &["cat", &path]);
    let output = command::run(&mut cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Regular files under `root` on `host` matched by each search rule, one
/// list per rule, relative to `root`.
///
/// Globs are expanded by bash (`globstar`, `dotglob`); an exec rule that
/// exits non-zero fails the whole listing.
pub fn list_files(
    tools: &Tools,
    host: &str,
    root: &Path,
    kinds: &[&SearchKind],
) -> Result<Vec<Vec<PathBuf>>> {
    let mut script = String::new();
    if !root.as_os_str().is_empty() {
        script.push_str(&format!(
            "cd {} || exit 3\n",
            shell_words::quote(&root.to_string_lossy())
        ));
    }
    script.push_str("shopt -s globstar nullglob dotglob\n");
    script.push_str(&format!("echo \"{LIST_START}\"\n"));
    for (i, kind) in kinds.iter().enumerate() {
        let line = match kind {
            SearchKind::Rglob(p) => glob_loop(i, &format!("**/{p}"))?,
            SearchKind::Glob(p) => glob_loop(i, p)?,
            SearchKind::Exec(c) => format!(
                "{{ {c}\n}} | while IFS= read -r f; do printf '{i}\\t%s\\n' \"$f\"; done\n\
                 [ \"${{PIPESTATUS[0]}}\" -eq 0 ] || exit 4\n"
            ),
        };
        script.push_str(&line);
    }
    script.push_str(&format!("echo \"{LIST_END}\"\n"));

    let mut cmd = tools.ssh_command(host, &["bash", "-s"]);
    let output = command::run_with_input(&mut cmd, &script)?;
    let found = parse_list_output(&String::from_utf8_lossy(&output.stdout), kinds.len())?;
    tracing::debug!(
        host,
        root = %root.display(),
        files = found.iter().map(Vec::len).sum::<usize>(),
        "listed remote files"
    );
    Ok(found)
}

fn glob_loop(index: usize, pattern: &str) -> Result<String> {
    if pattern.contains('\n') {
        return Err(SyncError::manifest(format!(
            "search pattern {pattern:?} cannot be sent to a remote shell"
        )));
    }
    Ok(format!(
        "for f in {pattern}; do [ -f \"$f\" ] && printf '{index}\\t%s\\n' \"$f\"; done\n"
    ))
}

fn parse_list_output(output: &str, rules: usize) -> Result<Vec<Vec<PathBuf>>> {
    let unparseable = |line: &str| SyncError::UnparseableOutput {
        tool: "ssh".into(),
        line: line.to_string(),
    };
    let Some(start) = output.find(LIST_START) else {
        return Err(unparseable(output.lines().next().unwrap_or_default()));
    };
    let body = &output[start + LIST_START.len()..];
    let Some(end) = body.find(LIST_END) else {
        return Err(unparseable("listing ended early"));
    };

    let mut found = vec![Vec::new(); rules];
    for line in body[..end].lines().filter(|l| !l.is_empty()) {
        let Some((index, path)) = line.split_once('\t') else {
            return Err(unparseable(line));
        };
        let index: usize = index.parse().map_err(|_| unparseable(line))?;
        let Some(list) = found.get_mut(index) else {
            return Err(unparseable(line));
        };
        list.push(crate::location::normalize_path(Path::new(path)));
    }
    Ok(found)
}

fn parse_info_output(output: &str) -> Result<Vec<Option<FileInfo>>> {
    let unparseable = |line: &str| SyncError::UnparseableOutput {
        tool: "ssh".into(),
        line: line.to_string(),
    };
    let Some(start) = output.find(INFO_START) else {
        return Err(unparseable(output.lines().next().unwrap_or_default()));
    };
    let body = &output[start + INFO_START.len()..];
    let body = body.find(INFO_END).map_or(body, |end| &body[..end]);

    let mut infos = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        if line == "MISSING" {
            infos.push(None);
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [status, size, mtime, sha] = fields.as_slice() else {
            return Err(unparseable(line));
        };
        if *status != "OK" {
            return Err(unparseable(line));
        }
        let size = size.parse::<u64>().map_err(|_| unparseable(line))?;
        let mtime = mtime.parse::<f64>().map_err(|_| unparseable(line))?;
        if sha.len() != 64 || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(unparseable(line));
        }
        infos.push(Some(FileInfo {
            sha256: sha.to_ascii_lowercase(),
            size,
            mtime,
        }));
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn test_parse_info_output() {
        let out = format!(
            "motd noise\n{INFO_START}\nOK\t6\t1700000000\t{SHA}\nMISSING\n{INFO_END}\n"
        );
        let infos = parse_info_output(&out).unwrap();
        assert_eq!(infos.len(), 2);
        let first = infos[0].as_ref().unwrap();
        assert_eq!(first.size, 6);
        assert_eq!(first.mtime, 1_700_000_000.0);
        assert_eq!(first.sha256, SHA);
        assert!(infos[1].is_none());
    }

    #[test]
    fn test_parse_info_output_rejects_garbage() {
        let out = format!("{INFO_START}\nOK\tsix\t1\t{SHA}\n{INFO_END}\n");
        assert!(matches!(
            parse_info_output(&out),
            Err(SyncError::UnparseableOutput { .. })
        ));
        assert!(parse_info_output("no markers at all").is_err());
    }

    #[test]
    fn test_parse_list_output() {
        let out = format!("banner\n{LIST_START}\n0\t./a.h5\n1\tsub/b.txt\n0\tc.h5\n{LIST_END}\n");
        let found = parse_list_output(&out, 2).unwrap();
        assert_eq!(found[0], [PathBuf::from("a.h5"), PathBuf::from("c.h5")]);
        assert_eq!(found[1], [PathBuf::from("sub/b.txt")]);

        let truncated = format!("{LIST_START}\n0\ta.h5\n");
        assert!(parse_list_output(&truncated, 1).is_err());
        let bad_index = format!("{LIST_START}\n7\ta.h5\n{LIST_END}\n");
        assert!(matches!(
            parse_list_output(&bad_index, 1),
            Err(SyncError::UnparseableOutput { .. })
        ));
    }

    #[test]
    fn test_parse_info_short_hash() {
        let out = format!("{INFO_START}\nOK\t1\t1\tabc\n{INFO_END}\n");
        assert!(parse_info_output(&out).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_info_script_runs_locally() {
        // The script is plain bash; run it through a fake "ssh" that just
        // executes the remote command locally.
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "hello\n").unwrap();
        let fake_ssh = tmp.path().join("fake-ssh");
        std::fs::write(&fake_ssh, "#!/bin/sh\nshift\neval \"$1\"\n").unwrap();
        std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tools = Tools {
            ssh: fake_ssh.to_string_lossy().into_owned(),
            ssh_options: Vec::new(),
            ..Tools::default()
        };
        if !tools.has("bash") {
            return;
        }
        let infos = compute_info(
            &tools,
            "localhost",
            tmp.path(),
            &[PathBuf::from("a.txt"), PathBuf::from("nope.txt")],
        )
        .unwrap();
        assert_eq!(infos[0].as_ref().unwrap().sha256, SHA);
        assert_eq!(infos[0].as_ref().unwrap().size, 6);
        assert!(infos[1].is_none());

        assert!(file_exists(&tools, "localhost", &tmp.path().join("a.txt")).unwrap());
        assert!(!file_exists(&tools, "localhost", &tmp.path().join("b.txt")).unwrap());

        make_dirs(&tools, "localhost", &[tmp.path().join("x/y")]).unwrap();
        assert!(tmp.path().join("x/y").is_dir());

        remove_file(&tools, "localhost", &tmp.path().join("a.txt")).unwrap();
        assert!(!tmp.path().join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_list_script_runs_locally() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(data.join("sub")).unwrap();
        for file in ["a.h5", "sub/b.h5", ".hidden.h5", "c.txt"] {
            std::fs::write(data.join(file), file).unwrap();
        }
        let fake_ssh = tmp.path().join("fake-ssh");
        std::fs::write(&fake_ssh, "#!/bin/sh\nshift\neval \"$1\"\n").unwrap();
        std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();
        let tools = Tools {
            ssh: fake_ssh.to_string_lossy().into_owned(),
            ssh_options: Vec::new(),
            ..Tools::default()
        };
        if !tools.has("bash") {
            return;
        }

        let rglob = SearchKind::Rglob("*.h5".into());
        let glob = SearchKind::Glob("*.txt".into());
        let exec = SearchKind::Exec("echo ./sub/b.h5".into());
        let mut found = list_files(&tools, "localhost", &data, &[&rglob, &glob, &exec]).unwrap();
        found[0].sort();
        assert_eq!(
            found[0],
            [PathBuf::from(".hidden.h5"), PathBuf::from("a.h5"), PathBuf::from("sub/b.h5")]
        );
        assert_eq!(found[1], [PathBuf::from("c.txt")]);
        assert_eq!(found[2], [PathBuf::from("sub/b.h5")]);

        let failing = SearchKind::Exec("exit 9".into());
        assert!(matches!(
            list_files(&tools, "localhost", &data, &[&failing]),
            Err(SyncError::Subprocess { .. })
        ));

        assert_eq!(read_file(&tools, "localhost", &data.join("c.txt")).unwrap(), "c.txt");
    }
}
