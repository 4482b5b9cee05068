use std::io;
use std::path::{Path, PathBuf};

/// 一次调用独占的输入/输出临时文件，drop 时删除
#[derive(Debug)]
pub struct TempAssets {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl TempAssets {
    pub fn new(scratch_dir: &Path, invocation: &str) -> Self {
        Self {
            input: scratch_dir.join(format!("{invocation}_in.png")),
            output: scratch_dir.join(format!("{invocation}_out.png")),
        }
    }
}

impl Drop for TempAssets {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
    }
}
