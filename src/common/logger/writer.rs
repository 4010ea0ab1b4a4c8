use std::{
    borrow::Cow,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes CSI escape sequences (`ESC [ params final`) so the log file stays
/// plain text. Any other escape drops `ESC` and the byte after it.
pub fn strip_ansi_escapes(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('\x1b') {
        out.push_str(&rest[..start]);
        let seq = &rest[start + 1..];
        let skip = match seq.strip_prefix('[') {
            Some(params) => match params.find(|c: char| ('@'..='~').contains(&c)) {
                Some(end) => end + 2,
                None => seq.len(),
            },
            None => seq.chars().next().map_or(0, char::len_utf8),
        };
        rest = &seq[skip..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

/// Byte offset at which the last `lines` lines of `content` begin.
fn tail_offset(content: &[u8], lines: usize) -> usize {
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.iter()
        .enumerate()
        .rev()
        .filter(|(_, b)| **b == b'\n')
        .nth(lines.saturating_sub(1))
        .map_or(0, |(i, _)| i + 1)
}

/// Log file capped to its most recent `max_lines` lines.
///
/// Output goes through one append handle shared by every clone. When the file
/// has grown `max(max_lines / 10, 50)` lines past the cap, its tail is copied
/// to a sibling file that then replaces it.
#[derive(Clone)]
pub(crate) struct LineCappedLog {
    inner: Arc<Mutex<LogFile>>,
}

struct LogFile {
    path: PathBuf,
    max_lines: usize,
    handle: Option<File>,
    /// Lines currently in the file; recounted whenever the handle is reopened.
    lines: usize,
}

impl LineCappedLog {
    pub fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogFile {
                path: path.into(),
                max_lines: (max_lines as usize).max(1),
                handle: None,
                lines: 0,
            })),
        }
    }
}

impl LogFile {
    fn slack(&self) -> usize {
        (self.max_lines / 10).max(50)
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        let file = match self.handle.take() {
            Some(file) => file,
            None => {
                self.lines = match fs::read(&self.path) {
                    Ok(content) => count_newlines(&content),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                    Err(e) => return Err(e),
                };
                OpenOptions::new().create(true).append(true).open(&self.path)?
            }
        };
        Ok(self.handle.insert(file))
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        self.handle()?.write_all(buf)?;
        self.lines += count_newlines(buf);

        if self.lines > self.max_lines + self.slack() {
            if let Err(e) = self.compact() {
                eprintln!("Failed to compact log file {}: {}", self.path.display(), e);
            }
        }
        Ok(())
    }

    fn compact(&mut self) -> io::Result<()> {
        self.handle = None;

        let content = fs::read(&self.path)?;
        let tail = &content[tail_offset(&content, self.max_lines)..];

        let staging = staging_path(&self.path);
        fs::write(&staging, tail)?;
        fs::rename(&staging, &self.path)?;
        self.lines = count_newlines(tail);
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".compact");
    PathBuf::from(name)
}

impl io::Write for LineCappedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock().handle.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LineCappedLog {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
