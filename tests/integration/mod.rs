// Integration test utilities shared across test binaries

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};

/// Temporary directory holding input files for file-backed readers
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Write a text file, creating parent directories as needed
    pub fn create_text_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        self.create_binary_file(relative_path, content.as_bytes())
    }

    /// Write raw bytes, for inputs that are not valid UTF-8
    pub fn create_binary_file<P: AsRef<Path>>(&self, relative_path: P, content: &[u8]) -> PathBuf {
        let file_path = self.root_path.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    /// A path inside the fixture that does not exist
    pub fn missing_file(&self, name: &str) -> PathBuf {
        self.root_path.join(name)
    }
}

/// Reader that hands out one predetermined piece per read call
///
/// Lets a test pin exact read boundaries independently of the buffer size.
pub struct PieceReader {
    pieces: VecDeque<Vec<u8>>,
}

impl PieceReader {
    pub fn new(pieces: Vec<Vec<u8>>) -> Self {
        Self { pieces: pieces.into() }
    }

    /// Cut `data` at every offset in `cuts` (ascending, in bounds)
    pub fn cut_at(data: &[u8], cuts: &[usize]) -> Self {
        let mut pieces = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            pieces.push(data[start..cut].to_vec());
            start = cut;
        }
        pieces.push(data[start..].to_vec());
        Self::new(pieces.into_iter().filter(|p| !p.is_empty()).collect())
    }
}

impl AsyncRead for PieceReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if let Some(mut piece) = self.pieces.pop_front() {
            let n = piece.len().min(buf.remaining());
            buf.put_slice(&piece[..n]);
            if n < piece.len() {
                piece.drain(..n);
                self.pieces.push_front(piece);
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Reader that serves `data` and then fails instead of reporting end of stream
pub struct FailingReader {
    data: Vec<u8>,
    served: bool,
}

impl FailingReader {
    pub fn new(data: &[u8]) -> Self {
        Self { data: data.to_vec(), served: false }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")));
        }
        let n = self.data.len().min(buf.remaining());
        buf.put_slice(&self.data[..n]);
        self.data.drain(..n);
        self.served = self.data.is_empty();
        Poll::Ready(Ok(()))
    }
}

/// Compare two normalized outputs line by line with a readable diff on mismatch
pub fn assert_same_output(actual: &str, expected: &str, context: &str) {
    let actual_lines: Vec<&str> = actual.split('\n').collect();
    let expected_lines: Vec<&str> = expected.split('\n').collect();

    if actual_lines.len() != expected_lines.len() {
        panic!(
            "{}: line count mismatch. Expected {} lines, got {} lines",
            context,
            expected_lines.len(),
            actual_lines.len()
        );
    }

    for (i, (actual_line, expected_line)) in actual_lines.iter().zip(expected_lines.iter()).enumerate() {
        if actual_line != expected_line {
            panic!(
                "{}: line {} mismatch\nExpected: {:?}\nActual:   {:?}",
                context,
                i + 1,
                expected_line,
                actual_line
            );
        }
    }
}
