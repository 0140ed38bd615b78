// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context as _;

use crate::context::TaskContext;

/// Helper for common file operations inside and outside of tasks.  Bound
/// to a task context, it logs each operation to that task's output.
pub struct FileHelper<'a> {
    ctx: Option<&'a mut TaskContext>,
    silent: bool,
}

impl<'a> FileHelper<'a> {
    pub fn new(ctx: &'a mut TaskContext) -> FileHelper<'a> {
        FileHelper {
            ctx: Some(ctx),
            silent: false,
        }
    }

    /// A helper with no context; nothing is logged.
    pub fn detached() -> FileHelper<'static> {
        FileHelper {
            ctx: None,
            silent: false,
        }
    }

    /// Suppress operation logging.
    pub fn silent(mut self, silent: bool) -> FileHelper<'a> {
        self.silent = silent;
        self
    }

    fn log(&mut self, text: String) {
        if self.silent {
            return;
        }
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.print(text);
        }
    }

    /// Create a directory tree.  With `exist_ok`, an already existing tree
    /// is fine; without it, an existing target is an error.
    pub fn makedirs(&mut self, path: impl AsRef<Path>, exist_ok: bool) -> io::Result<()> {
        let path = path.as_ref();
        self.log(format!("Created Directory(s): \"{}\"", path.display()));
        if !exist_ok && path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("\"{}\" already exists", path.display()),
            ));
        }
        fs::create_dir_all(path)
    }

    /// Create a file, or update its modification time if it exists.  Without
    /// `exist_ok`, an existing file is an error.
    pub fn touch(&mut self, path: impl AsRef<Path>, exist_ok: bool) -> io::Result<()> {
        let path = path.as_ref();
        self.log(format!("Touch File: \"{}\"", path.display()));
        let file = if exist_ok {
            OpenOptions::new().create(true).write(true).open(path)?
        } else {
            OpenOptions::new().create_new(true).write(true).open(path)?
        };
        file.set_modified(SystemTime::now())
    }

    /// Copy a file.  With `copy_metadata`, the source's modification time
    /// carries over to the destination (permission bits always do).
    pub fn copy(
        &mut self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        copy_metadata: bool,
    ) -> io::Result<()> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        if copy_metadata {
            self.log(format!(
                "Copy File With Metadata: \"{}\" -> \"{}\"",
                src.display(),
                dest.display()
            ));
            fs::copy(src, dest)?;
            let mtime = fs::metadata(src)?.modified()?;
            let dest_file = OpenOptions::new().write(true).open(dest)?;
            dest_file.set_modified(mtime)
        } else {
            self.log(format!(
                "Copy File: \"{}\" -> \"{}\"",
                src.display(),
                dest.display()
            ));
            fs::copy(src, dest).map(|_| ())
        }
    }

    /// Copy an entire directory tree recursively.
    pub fn copytree(&mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> io::Result<()> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.log(format!(
            "Copy Tree: \"{}\" -> \"{}\"",
            src.display(),
            dest.display()
        ));
        copy_dir_recursive(src, dest)
    }

    /// Move a file, falling back to copy-and-remove across filesystems.
    pub fn move_file(&mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> io::Result<()> {
        let (src, dest) = (src.as_ref(), dest.as_ref());
        self.log(format!(
            "Move Files: \"{}\" -> \"{}\"",
            src.display(),
            dest.display()
        ));
        match fs::rename(src, dest) {
            Ok(()) => Ok(()),
            Err(_) => {
                fs::copy(src, dest)?;
                fs::remove_file(src)
            }
        }
    }

    /// Remove a file if it exists.  With `must_exist`, a missing file is
    /// an error.
    pub fn remove(&mut self, path: impl AsRef<Path>, must_exist: bool) -> io::Result<()> {
        let path = path.as_ref();
        self.log(format!("Remove: \"{}\"", path.display()));
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !must_exist => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove a directory tree if it exists, including non-empty
    /// directories.  With `must_exist`, a missing tree is an error.
    pub fn removedirs(&mut self, path: impl AsRef<Path>, must_exist: bool) -> io::Result<()> {
        let path = path.as_ref();
        self.log(format!("Remove Directory(s): \"{}\"", path.display()));
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !must_exist => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove all files matching a glob pattern.
    pub fn glob_remove(&mut self, pattern: &str) -> anyhow::Result<()> {
        self.log(format!("Glob Remove Files: \"{}\"", pattern));
        for entry in glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern '{}'", pattern))?
        {
            let path = entry?;
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Error removing \"{}\"", path.display()))?;
            }
        }
        Ok(())
    }

    /// Remove all directories matching a glob pattern, non-empty included.
    pub fn glob_remove_dirs(&mut self, pattern: &str) -> anyhow::Result<()> {
        self.log(format!("Glob Remove Directories: \"{}\"", pattern));
        for entry in glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern '{}'", pattern))?
        {
            let path = entry?;
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Error removing \"{}\"", path.display()))?;
            }
        }
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use mktemp::Temp;

    use crate::concurrent_io::test_support::SharedBuf;
    use crate::forge::{Forge, ForgeConfig};
    use crate::task::{TaskRef, TaskSpec};

    #[test]
    fn test_touch_and_remove() {
        let dir = Temp::new_dir().unwrap();
        let file = dir.join("touched");

        let mut helper = FileHelper::detached();
        helper.touch(&file, true).unwrap();
        assert!(file.is_file());

        // An existing file is an error without exist_ok
        assert!(helper.touch(&file, false).is_err());

        // Touching again updates the mtime
        let before = fs::metadata(&file).unwrap().modified().unwrap();
        let file_handle = OpenOptions::new().write(true).open(&file).unwrap();
        file_handle
            .set_modified(before - std::time::Duration::from_secs(60))
            .unwrap();
        drop(file_handle);
        helper.touch(&file, true).unwrap();
        let after = fs::metadata(&file).unwrap().modified().unwrap();
        assert!(after > before - std::time::Duration::from_secs(60));

        helper.remove(&file, true).unwrap();
        assert!(!file.exists());
        // Missing file is fine without must_exist
        helper.remove(&file, false).unwrap();
        assert!(helper.remove(&file, true).is_err());
    }

    #[test]
    fn test_makedirs_and_removedirs() {
        let dir = Temp::new_dir().unwrap();
        let tree = dir.join("a/b/c");

        let mut helper = FileHelper::detached();
        helper.makedirs(&tree, true).unwrap();
        assert!(tree.is_dir());
        // Existing tree is fine with exist_ok, an error without
        helper.makedirs(&tree, true).unwrap();
        assert!(helper.makedirs(&tree, false).is_err());

        helper.touch(tree.join("f"), true).unwrap();
        helper.removedirs(dir.join("a"), true).unwrap();
        assert!(!dir.join("a").exists());
        helper.removedirs(dir.join("a"), false).unwrap();
    }

    #[test]
    fn test_copy_and_copytree() {
        let dir = Temp::new_dir().unwrap();
        let mut helper = FileHelper::detached();

        let src = dir.join("src.txt");
        fs::write(&src, b"content").unwrap();
        helper.copy(&src, dir.join("dst.txt"), false).unwrap();
        assert_eq!(fs::read(dir.join("dst.txt")).unwrap(), b"content");

        helper.makedirs(dir.join("tree/nested"), true).unwrap();
        fs::write(dir.join("tree/nested/file"), b"x").unwrap();
        helper.copytree(dir.join("tree"), dir.join("copy")).unwrap();
        assert_eq!(fs::read(dir.join("copy/nested/file")).unwrap(), b"x");
    }

    #[test]
    fn test_copy_with_metadata_carries_mtime() {
        let dir = Temp::new_dir().unwrap();
        let mut helper = FileHelper::detached();

        let src = dir.join("src.txt");
        fs::write(&src, b"content").unwrap();
        let old = SystemTime::now() - std::time::Duration::from_secs(3600);
        let src_handle = OpenOptions::new().write(true).open(&src).unwrap();
        src_handle.set_modified(old).unwrap();
        drop(src_handle);
        let src_mtime = fs::metadata(&src).unwrap().modified().unwrap();

        helper.copy(&src, dir.join("meta.txt"), true).unwrap();
        let dest_mtime = fs::metadata(dir.join("meta.txt")).unwrap().modified().unwrap();
        assert_eq!(dest_mtime, src_mtime);

        // A plain copy gets a fresh mtime
        helper.copy(&src, dir.join("plain.txt"), false).unwrap();
        let plain_mtime = fs::metadata(dir.join("plain.txt")).unwrap().modified().unwrap();
        assert!(plain_mtime > src_mtime);
    }

    #[test]
    fn test_glob_remove() {
        let dir = Temp::new_dir().unwrap();
        let mut helper = FileHelper::detached();

        fs::write(dir.join("a.tmp"), b"").unwrap();
        fs::write(dir.join("b.tmp"), b"").unwrap();
        fs::write(dir.join("keep.txt"), b"").unwrap();

        helper
            .glob_remove(&format!("{}/*.tmp", dir.to_string_lossy()))
            .unwrap();
        assert!(!dir.join("a.tmp").exists());
        assert!(!dir.join("b.tmp").exists());
        assert!(dir.join("keep.txt").exists());
    }

    #[test]
    fn test_operations_log_to_task_output() {
        let dir = Temp::new_dir().unwrap();
        let target = dir.join("made");

        let buf = SharedBuf::new();
        let mut forge = Forge::new(ForgeConfig {
            stdout: Some(Box::new(buf.clone())),
            show_task_headers: false,
            ..ForgeConfig::default()
        });

        let target_path = target.clone();
        forge
            .add_task("files", TaskSpec::default(), move |ctx| {
                let mut helper = FileHelper::new(ctx);
                helper.makedirs(&target_path, true)?;
                Ok(())
            })
            .unwrap();

        let forge = Arc::new(forge);
        forge.run(&[TaskRef::from("files")], 1).unwrap();

        assert!(target.is_dir());
        assert!(buf.contents().contains("Created Directory(s):"));
    }
}
