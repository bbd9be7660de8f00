//! Ephemeral per-invocation staging directories.
//!
//! A [`Workspace`] owns its directory: dropping it removes the directory, so
//! every exit path of an invocation (including panics and cancelled futures)
//! cleans up. [`Workspace::close`] removes it eagerly and reports failures.

use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

use crate::language::Runtime;
use crate::spec::FunctionSpec;

const PREFIX: &str = "funcbox-";

/// A staged workspace holding the entry file and support files.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    files: Vec<(String, String)>,
}

impl Workspace {
    /// Writes `spec`'s code and the runtime's support files into a fresh,
    /// uniquely named directory under `root` (or the system temp dir).
    ///
    /// On error the partially written directory is removed before returning.
    pub fn stage(root: Option<&Path>, runtime: &Runtime, spec: &FunctionSpec) -> io::Result<Self> {
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(PREFIX).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(PREFIX).tempdir()?,
        };

        let mut files = Vec::with_capacity(1 + runtime.support_files.len());
        files.push((runtime.entry_file.clone(), spec.code().to_string()));
        files.extend(runtime.support_files.iter().cloned());

        for (name, content) in &files {
            let path = dir.path().join(name);
            fs::write(&path, content)?;
            make_readable(&path, 0o644)?;
        }
        // Sandboxes may run as a non-root user
        make_readable(dir.path(), 0o755)?;

        debug!(path = %dir.path().display(), files = files.len(), "Staged workspace");
        Ok(Self { dir, files })
    }

    /// Host directory mounted into the sandbox.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staged files in write order, entry file first.
    pub fn files(&self) -> &[(String, String)] {
        &self.files
    }

    /// Removes the directory now, surfacing any error.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[cfg(unix)]
fn make_readable(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn make_readable(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn python_spec(code: &str) -> FunctionSpec {
        FunctionSpec::new("python", code, 5).unwrap()
    }

    #[test]
    fn test_stage_writes_entry_and_support_files() {
        let root = tempdir().unwrap();
        let ws = Workspace::stage(Some(root.path()), &Runtime::python(), &python_spec("print('hi')"))
            .unwrap();

        assert!(ws
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("funcbox-"));
        assert_eq!(
            fs::read_to_string(ws.path().join("function.py")).unwrap(),
            "print('hi')"
        );
        assert_eq!(
            fs::read_to_string(ws.path().join("requirements.txt")).unwrap(),
            "# Function dependencies\n"
        );
        let names: Vec<&str> = ws.files().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["function.py", "requirements.txt"]);
    }

    #[test]
    fn test_javascript_has_single_file() {
        let root = tempdir().unwrap();
        let spec = FunctionSpec::new("javascript", "console.log(1)", 5).unwrap();
        let ws = Workspace::stage(Some(root.path()), &Runtime::javascript(), &spec).unwrap();
        assert_eq!(ws.files().len(), 1);
        assert_eq!(fs::read_dir(ws.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempdir().unwrap();
        let spec = python_spec("pass");
        let a = Workspace::stage(Some(root.path()), &Runtime::python(), &spec).unwrap();
        let b = Workspace::stage(Some(root.path()), &Runtime::python(), &spec).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_close_removes_directory() {
        let root = tempdir().unwrap();
        let ws = Workspace::stage(Some(root.path()), &Runtime::python(), &python_spec("pass")).unwrap();
        let path = ws.path().to_path_buf();
        ws.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempdir().unwrap();
        let path = {
            let ws = Workspace::stage(Some(root.path()), &Runtime::python(), &python_spec("pass"))
                .unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_stage_leaves_nothing() {
        let root = tempdir().unwrap();
        let mut runtime = Runtime::python();
        // A support file inside a missing subdirectory cannot be written
        runtime
            .support_files
            .push(("missing/dir.txt".to_string(), String::new()));

        let result = Workspace::stage(Some(root.path()), &runtime, &python_spec("pass"));
        assert!(result.is_err());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_creates_missing_root() {
        let base = tempdir().unwrap();
        let root = base.path().join("nested").join("root");
        let ws = Workspace::stage(Some(&root), &Runtime::python(), &python_spec("pass")).unwrap();
        assert!(ws.path().starts_with(&root));
    }

    #[cfg(unix)]
    #[test]
    fn test_workspace_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempdir().unwrap();
        let ws = Workspace::stage(Some(root.path()), &Runtime::python(), &python_spec("pass")).unwrap();
        let mode = fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        let file_mode = fs::metadata(ws.path().join("function.py"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o644);
    }
}
