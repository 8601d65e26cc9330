use std::{
    fs,
    io::{self, prelude::*},
    path,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleOutputError {
    #[error("Console output file {0} does not exist yet")]
    NotFound(path::PathBuf),
    #[error("Console output file is empty")]
    Empty,
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// Reads the console output an external process is still appending to.
///
/// The whole stream is read on each call to [`ConsoleOutputReader::read_text`]. Bytes that
/// are not valid UTF-8 are replaced rather than rejected, since a tool may be cut off in
/// the middle of a multi-byte character.
pub struct ConsoleOutputReader<R: io::Read> {
    pub handle: io::BufReader<R>,
    /// The number of bytes consumed by the last read
    pub offset: usize,
}

const BUFFER_SIZE: usize = 8192;

impl<R: io::Read> ConsoleOutputReader<R> {
    pub fn new(file: R) -> ConsoleOutputReader<R> {
        let handle = io::BufReader::with_capacity(BUFFER_SIZE, file);
        ConsoleOutputReader { handle, offset: 0 }
    }

    /// Read everything available from the stream.
    ///
    /// Unless `include_partial` is set, a trailing line without a line terminator is
    /// left out because the writer may still be in the middle of it.
    pub fn read_text(&mut self, include_partial: bool) -> Result<String, ConsoleOutputError> {
        let mut buffer = Vec::new();
        let b = self.handle.read_to_end(&mut buffer)?;
        self.offset = b;
        if buffer.is_empty() {
            return Err(ConsoleOutputError::Empty);
        }
        if !include_partial {
            match buffer.iter().rposition(|c| *c == b'\n' || *c == b'\r') {
                Some(i) => buffer.truncate(i + 1),
                None => buffer.clear(),
            }
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ConsoleOutputReader<fs::File> {
    /// Open the console output file for reading. Other processes may keep writing to it.
    pub fn open_path<P: AsRef<path::Path>>(path: P) -> Result<Self, ConsoleOutputError> {
        let path = path.as_ref();
        match fs::File::open(path) {
            Ok(handle) => Ok(Self::new(handle)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ConsoleOutputError::NotFound(path.to_path_buf()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Split console output into lines.
///
/// Progress that a tool redraws in place with carriage returns is split into one line
/// per redraw. Empty lines between `\n` terminators are kept so that line positions
/// match the file.
pub fn split_console_lines(text: &str) -> impl Iterator<Item = &str> {
    indexed_console_lines(text).map(|(_, line)| line)
}

/// As [`split_console_lines`], paired with the 0-based index of the `\n`-terminated
/// line each piece came from. All redraws of one physical line share its index.
pub fn indexed_console_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.split('\n').enumerate().flat_map(|(i, line)| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let redraws = line.contains('\r');
        line.split('\r')
            .filter(move |segment| !(redraws && segment.is_empty()))
            .map(move |segment| (i, segment))
    })
}
