use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use {
    tempfile::TempPath,
    tokio::{
        fs::File,
        io::{AsyncSeekExt, AsyncWriteExt},
    },
    tracing::debug,
};

/// Fallback name when the URL carries no usable file name.
pub const DEFAULT_FILE_NAME: &str = "downloaded_file";

/// Byte budget for the hint, leaving room for the `ferry-<random>-` prefix
/// under the usual 255-byte file name limit.
const MAX_FILE_NAME_BYTES: usize = 128;

/// Longest suffix after the last dot still treated as an extension.
const MAX_EXTENSION_BYTES: usize = 16;

/// Directory that hands out exclusively-owned temporary files.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a new staged file.
    ///
    /// The on-disk name is `ferry-<random>-<hint>`; the random part keeps
    /// concurrent relays apart, the hint only helps when inspecting the
    /// directory.
    pub async fn acquire(&self, name_hint: &str) -> io::Result<StagedFile> {
        tokio::fs::create_dir_all(&self.root).await?;
        let file_name = sanitize_file_name(name_hint);
        let named = tempfile::Builder::new()
            .prefix("ferry-")
            .suffix(&format!("-{file_name}"))
            .tempfile_in(&self.root)?;
        let (file, path) = named.into_parts();
        debug!(path = %path.display(), "staged file acquired");
        Ok(StagedFile {
            file: File::from_std(file),
            path,
            file_name,
        })
    }
}

/// One temporary file owned by a single relay.
///
/// The file is deleted by [`release`](StagedFile::release), or when the value
/// is dropped without being released (panic, task abort).
#[derive(Debug)]
pub struct StagedFile {
    file: File,
    path: TempPath,
    file_name: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitised name to present the document under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Sequential writer positioned at the end of what was written so far.
    pub fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// Finish pending writes and move back to offset 0.
    pub async fn rewind_for_read(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Reader over the staged bytes, meaningful after [`rewind_for_read`].
    ///
    /// [`rewind_for_read`]: StagedFile::rewind_for_read
    pub fn reader(&mut self) -> &mut File {
        &mut self.file
    }

    pub async fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    /// Close and delete the file.
    pub fn release(self) -> io::Result<()> {
        let Self { file, path, .. } = self;
        drop(file);
        let shown = path.display().to_string();
        path.close()?;
        debug!(path = %shown, "staged file released");
        Ok(())
    }
}

/// Reduce an arbitrary hint to a filesystem-safe file name.
///
/// Path separators and control characters become `_`; everything else,
/// including non-ASCII letters, is kept. Long names lose the end of the stem
/// while the extension survives.
pub fn sanitize_file_name(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return DEFAULT_FILE_NAME.to_string();
    }
    truncate_keeping_extension(cleaned, MAX_FILE_NAME_BYTES)
}

fn truncate_keeping_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };
    let mut end = max_bytes - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{extension}", &stem[..end])
}
