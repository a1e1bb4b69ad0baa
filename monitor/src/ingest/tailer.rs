//! Rotating tailer.
//!
//! A [`RotatingTailer`] follows "the current file" of one log family and
//! hands every complete line to its handler. The current file is whatever
//! the family's [`Watcher`] reports as newest; when that changes the tailer
//! finishes the old file, closes it and reads the new one from offset 0.
//!
//! The loop has two states:
//!
//! - **Locating**: no file open. The watcher is polled every
//!   `rotation_poll` until it reports a file.
//! - **Streaming**: a [`TailCursor`] is open. Lines are read until EOF,
//!   then the watcher is consulted again; a different path means a switch,
//!   otherwise the tailer idles for `idle_poll`.
//!
//! Read errors drop the cursor and return to Locating after a backoff of
//! `rotation_poll`. The tailer remembers where it stopped, so picking the
//! same file up again resumes at the saved offset.
//!
//! Only the very first file, already present when the tailer starts, is
//! opened at its end. Files that show up later are read from the beginning,
//! except a recently abandoned file that becomes newest again: it resumes
//! where the tailer left it.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::TailError;
use super::file_id::FileId;
use super::watcher::Watcher;
use crate::shutdown::{self, CancellationToken};

/// Upper bound on lines delivered by a single [`RotatingTailer::step`].
pub const DEFAULT_MAX_LINES_PER_STEP: usize = 1024;

/// How many abandoned files a tailer remembers offsets for.
const REMEMBERED_FILES: usize = 16;

/// What the caller should do after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// More work is ready; step again immediately.
    Continue,
    /// Nothing to do right now; sleep for the given interval.
    Wait(Duration),
}

/// Read position inside the file currently being followed.
#[derive(Debug)]
pub struct TailCursor {
    path: PathBuf,
    id: FileId,
    offset: u64,
    started_from_beginning: bool,
    reader: BufReader<File>,
    // Bytes of a line whose terminating newline has not been written yet.
    partial: Vec<u8>,
}

impl TailCursor {
    fn open(path: &Path, start: Start) -> Result<Self, TailError> {
        let file = File::open(path).map_err(|source| TailError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = file.metadata().map_err(|source| TailError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let (offset, started_from_beginning) = match start {
            Start::End => (metadata.len(), false),
            Start::Beginning => (0, true),
            Start::Resume(offset) => (offset, false),
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TailError::Seek {
                path: path.to_path_buf(),
                offset,
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            id: FileId::from_metadata(&metadata),
            offset,
            started_from_beginning,
            reader,
            partial: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last complete line delivered.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn started_from_beginning(&self) -> bool {
        self.started_from_beginning
    }

    /// Reads the next complete line, without its terminator.
    ///
    /// Returns `None` at EOF. A trailing fragment without a newline is held
    /// back until the rest of the line arrives.
    fn next_line(&mut self) -> Result<Option<String>, TailError> {
        let read = self
            .reader
            .read_until(b'\n', &mut self.partial)
            .map_err(|source| TailError::Read {
                path: self.path.clone(),
                source,
            })?;

        if read == 0 || self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        let raw = std::mem::take(&mut self.partial);
        self.offset += raw.len() as u64;
        Ok(Some(decode_line(&raw)))
    }

    /// Takes whatever unterminated fragment is left. Used when the file is
    /// being abandoned, so the fragment will never be completed.
    fn take_fragment(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.partial);
        self.offset += raw.len() as u64;
        Some(decode_line(&raw))
    }

    /// True when the path now names a different file, or the file shrank
    /// below what has already been read.
    fn is_replaced(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(meta) => FileId::from_metadata(&meta) != self.id || meta.len() < self.offset,
            Err(e) => {
                debug!(path = %self.path.display(), "cannot stat followed file: {e}");
                false
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[derive(Clone, Copy, Debug)]
enum Start {
    End,
    Beginning,
    Resume(u64),
}

/// Where a previous cursor stopped.
#[derive(Debug)]
struct ResumePoint {
    path: PathBuf,
    id: FileId,
    offset: u64,
}

impl ResumePoint {
    fn of(cursor: &TailCursor) -> Self {
        Self {
            path: cursor.path.clone(),
            id: cursor.id,
            offset: cursor.offset,
        }
    }

    /// The saved offset, if `path` still names the same file and it has not
    /// shrunk below it.
    fn offset_for(&self, path: &Path) -> Option<u64> {
        if self.path != path {
            return None;
        }
        match fs::metadata(path) {
            Ok(meta) if FileId::from_metadata(&meta) == self.id && meta.len() >= self.offset => {
                Some(self.offset)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
enum State {
    Locating,
    Streaming(TailCursor),
}

/// Follows the newest file of one log family.
///
/// Generic over:
///
/// - `W`: the [`Watcher`] that names the current file,
/// - `H`: the line handler, called once per complete, non-empty line.
pub struct RotatingTailer<W, H> {
    family: &'static str,
    watcher: W,
    handler: H,
    rotation_poll: Duration,
    idle_poll: Duration,
    max_lines_per_step: usize,
    state: State,
    // Set until the first open; cleared as soon as the watcher reports an
    // empty directory, since anything appearing after that is new. Watcher
    // errors leave it untouched.
    skip_history: bool,
    resume: Option<ResumePoint>,
    // Files left behind by a switch, oldest first.
    abandoned: VecDeque<ResumePoint>,
}

impl<W, H> RotatingTailer<W, H>
where
    W: Watcher,
    H: FnMut(&str),
{
    pub fn new(
        family: &'static str,
        watcher: W,
        handler: H,
        rotation_poll: Duration,
        idle_poll: Duration,
    ) -> Self {
        Self {
            family,
            watcher,
            handler,
            rotation_poll,
            idle_poll,
            max_lines_per_step: DEFAULT_MAX_LINES_PER_STEP,
            state: State::Locating,
            skip_history: true,
            resume: None,
            abandoned: VecDeque::new(),
        }
    }

    pub fn with_max_lines_per_step(mut self, max: usize) -> Self {
        self.max_lines_per_step = max.max(1);
        self
    }

    /// The open cursor, if the tailer is streaming.
    pub fn cursor(&self) -> Option<&TailCursor> {
        match &self.state {
            State::Streaming(cursor) => Some(cursor),
            State::Locating => None,
        }
    }

    /// Runs the tailer until `shutdown` is cancelled.
    pub fn run(&mut self, shutdown: &CancellationToken) {
        info!(family = self.family, "tailer started");
        while !shutdown.is_cancelled() {
            if let Step::Wait(interval) = self.step() {
                shutdown::sleep(shutdown, interval);
            }
        }
        info!(family = self.family, "tailer stopped");
    }

    /// Performs one unit of work without sleeping.
    pub fn step(&mut self) -> Step {
        match std::mem::replace(&mut self.state, State::Locating) {
            State::Locating => self.locate(),
            State::Streaming(cursor) => self.stream(cursor),
        }
    }

    fn locate(&mut self) -> Step {
        let latest = match self.watcher.latest_file() {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.skip_history = false;
                debug!(family = self.family, "no log file found, retrying");
                return Step::Wait(self.rotation_poll);
            }
            // A failed scan says nothing about history; keep the start policy.
            Err(e) => {
                warn!(family = self.family, "cannot locate log file: {e}");
                return Step::Wait(self.rotation_poll);
            }
        };

        let start = self.start_for(&latest);
        match TailCursor::open(&latest, start) {
            Ok(cursor) => {
                self.skip_history = false;
                self.resume = None;
                info!(
                    family = self.family,
                    path = %cursor.path().display(),
                    offset = cursor.offset(),
                    from_beginning = cursor.started_from_beginning(),
                    "streaming log file"
                );
                self.state = State::Streaming(cursor);
                Step::Continue
            }
            Err(e) => {
                warn!(family = self.family, "{e}");
                Step::Wait(self.rotation_poll)
            }
        }
    }

    fn start_for(&mut self, path: &Path) -> Start {
        if self.skip_history {
            return Start::End;
        }
        let failed_at = self.resume.as_ref().and_then(|r| r.offset_for(path));
        match failed_at.or_else(|| self.take_abandoned(path)) {
            Some(offset) => Start::Resume(offset),
            None => Start::Beginning,
        }
    }

    /// Forgets `path`'s abandoned entry, returning its offset if the file is
    /// still the one that was left.
    fn take_abandoned(&mut self, path: &Path) -> Option<u64> {
        let pos = self.abandoned.iter().position(|p| p.path == path)?;
        self.abandoned.remove(pos)?.offset_for(path)
    }

    fn remember_abandoned(&mut self, point: ResumePoint) {
        self.abandoned.retain(|p| p.path != point.path);
        if self.abandoned.len() == REMEMBERED_FILES {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(point);
    }

    fn stream(&mut self, mut cursor: TailCursor) -> Step {
        for _ in 0..self.max_lines_per_step {
            match cursor.next_line() {
                Ok(Some(line)) => self.deliver(&line),
                Ok(None) => return self.at_eof(cursor),
                Err(e) => return self.fail(cursor, e),
            }
        }
        self.state = State::Streaming(cursor);
        Step::Continue
    }

    fn at_eof(&mut self, cursor: TailCursor) -> Step {
        let latest = match self.watcher.latest_file() {
            Ok(latest) => latest,
            Err(e) => {
                debug!(family = self.family, "rotation check failed: {e}");
                None
            }
        };

        match latest {
            Some(next) if next != cursor.path => self.switch(cursor, next),
            _ if cursor.is_replaced() => {
                let path = cursor.path.clone();
                self.switch(cursor, path)
            }
            _ => {
                self.state = State::Streaming(cursor);
                Step::Wait(self.idle_poll)
            }
        }
    }

    fn switch(&mut self, mut old: TailCursor, next: PathBuf) -> Step {
        if let Some(fragment) = old.take_fragment() {
            self.deliver(&fragment);
        }
        info!(
            family = self.family,
            from = %old.path().display(),
            to = %next.display(),
            "switching to new log file"
        );
        let left = ResumePoint::of(&old);
        drop(old);

        let start = match self.take_abandoned(&next) {
            Some(offset) => Start::Resume(offset),
            None => Start::Beginning,
        };
        // A replaced file is re-read from 0; its old offset means nothing.
        if left.path != next {
            self.remember_abandoned(left);
        }

        match TailCursor::open(&next, start) {
            Ok(cursor) => {
                self.state = State::Streaming(cursor);
                Step::Continue
            }
            Err(e) => {
                warn!(family = self.family, "{e}");
                Step::Wait(self.rotation_poll)
            }
        }
    }

    fn fail(&mut self, cursor: TailCursor, error: TailError) -> Step {
        warn!(
            family = self.family,
            backoff = ?self.rotation_poll,
            "{error}; relocating"
        );
        self.resume = Some(ResumePoint::of(&cursor));
        Step::Wait(self.rotation_poll)
    }

    fn deliver(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        (self.handler)(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::watcher::DirectoryWatcher;
    use crate::ingest::error::WatchError;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::time::{Instant, UNIX_EPOCH};
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_secs(10);
    const IDLE: Duration = Duration::from_secs(1);

    type Lines = std::rc::Rc<std::cell::RefCell<Vec<String>>>;

    fn tailer(dir: &Path) -> (RotatingTailer<DirectoryWatcher, impl FnMut(&str)>, Lines) {
        let seen: Lines = Default::default();
        let sink = seen.clone();
        let tailer = RotatingTailer::new(
            "test",
            DirectoryWatcher::new(dir),
            move |line: &str| sink.borrow_mut().push(line.to_string()),
            POLL,
            IDLE,
        );
        (tailer, seen)
    }

    fn write_at(path: &Path, contents: &str, mtime_secs: u64) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs))
            .unwrap();
    }

    fn drain<W: Watcher, H: FnMut(&str)>(tailer: &mut RotatingTailer<W, H>) -> Step {
        loop {
            match tailer.step() {
                Step::Continue => continue,
                wait => return wait,
            }
        }
    }

    #[test]
    fn empty_directory_keeps_locating() {
        let dir = TempDir::new().unwrap();
        let (mut tailer, seen) = tailer(dir.path());

        assert_eq!(tailer.step(), Step::Wait(POLL));
        assert!(tailer.cursor().is_none());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn existing_file_is_opened_at_its_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        write_at(&path, "old 1\nold 2\n", 100);

        let (mut tailer, seen) = tailer(dir.path());
        assert_eq!(drain(&mut tailer), Step::Wait(IDLE));

        let cursor = tailer.cursor().unwrap();
        assert_eq!(cursor.offset(), 12);
        assert!(!cursor.started_from_beginning());
        assert!(seen.borrow().is_empty());

        write_at(&path, "new 1\n", 100);
        drain(&mut tailer);
        assert_eq!(*seen.borrow(), vec!["new 1"]);
    }

    #[test]
    fn file_appearing_after_start_is_read_in_full() {
        let dir = TempDir::new().unwrap();
        let (mut tailer, seen) = tailer(dir.path());
        assert_eq!(tailer.step(), Step::Wait(POLL));

        write_at(&dir.path().join("0001"), "a\nb\n", 100);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["a", "b"]);
        assert!(tailer.cursor().unwrap().started_from_beginning());
    }

    #[test]
    fn rotation_reads_new_file_from_offset_zero() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("0001");
        write_at(&first, "history\n", 100);

        let (mut tailer, seen) = tailer(dir.path());
        drain(&mut tailer);

        write_at(&first, "tail of first\n", 100);
        let second = dir.path().join("0002");
        write_at(&second, "b1\nb2\n", 200);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["tail of first", "b1", "b2"]);
        let cursor = tailer.cursor().unwrap();
        assert_eq!(cursor.path(), second.as_path());
        assert!(cursor.started_from_beginning());
        assert_eq!(cursor.offset(), 6);
    }

    #[test]
    fn partial_line_waits_for_its_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        write_at(&path, "", 100);

        let (mut tailer, seen) = tailer(dir.path());
        drain(&mut tailer);

        write_at(&path, "{\"height\":", 100);
        drain(&mut tailer);
        assert!(seen.borrow().is_empty());
        assert_eq!(tailer.cursor().unwrap().offset(), 0);

        write_at(&path, "1}\r\n", 100);
        drain(&mut tailer);
        assert_eq!(*seen.borrow(), vec!["{\"height\":1}"]);
        assert_eq!(tailer.cursor().unwrap().offset(), 14);
    }

    #[test]
    fn fragment_of_abandoned_file_is_flushed_on_switch() {
        let dir = TempDir::new().unwrap();
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();

        write_at(&dir.path().join("0001"), "done\nunterminated", 100);
        drain(&mut tailer);
        write_at(&dir.path().join("0002"), "next\n", 200);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["done", "unterminated", "next"]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();

        write_at(&dir.path().join("0001"), "one\n\n   \ntwo\n", 100);
        drain(&mut tailer);
        assert_eq!(*seen.borrow(), vec!["one", "two"]);
    }

    #[test]
    fn truncated_file_is_reread_from_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();

        write_at(&path, "first line\nsecond line\n", 100);
        drain(&mut tailer);

        fs::write(&path, "x\n").unwrap();
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["first line", "second line", "x"]);
        assert_eq!(tailer.cursor().unwrap().offset(), 2);
    }

    #[test]
    fn offset_never_decreases_while_streaming_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        let (mut tailer, _seen) = tailer(dir.path());
        tailer.step();
        write_at(&path, "", 100);

        let mut last = 0;
        for i in 0..20 {
            write_at(&path, &format!("line {i}\n"), 100);
            drain(&mut tailer);
            let offset = tailer.cursor().unwrap().offset();
            assert!(offset >= last);
            last = offset;
        }
    }

    #[test]
    fn step_budget_bounds_lines_per_step() {
        let dir = TempDir::new().unwrap();
        let (tailer, seen) = tailer(dir.path());
        let mut tailer = tailer.with_max_lines_per_step(2);
        tailer.step();

        write_at(&dir.path().join("0001"), "1\n2\n3\n4\n5\n", 100);
        assert_eq!(tailer.step(), Step::Continue); // open
        assert_eq!(tailer.step(), Step::Continue);
        assert_eq!(seen.borrow().len(), 2);

        drain(&mut tailer);
        assert_eq!(seen.borrow().len(), 5);
    }

    #[test]
    fn failure_resumes_at_saved_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();
        write_at(&path, "a\nb\n", 100);
        drain(&mut tailer);

        // Simulate a read failure on the open cursor.
        let State::Streaming(cursor) = std::mem::replace(&mut tailer.state, State::Locating) else {
            panic!("expected an open cursor");
        };
        let err = TailError::Read {
            path: path.clone(),
            source: std::io::Error::other("disk hiccup"),
        };
        assert_eq!(tailer.fail(cursor, err), Step::Wait(POLL));
        assert!(tailer.cursor().is_none());

        write_at(&path, "c\n", 100);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
        let cursor = tailer.cursor().unwrap();
        assert_eq!(cursor.offset(), 6);
        assert!(!cursor.started_from_beginning());
    }

    #[test]
    fn late_write_to_abandoned_file_resumes_at_its_offset() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("0001");
        let second = dir.path().join("0002");
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();

        write_at(&first, "a1\n", 100);
        drain(&mut tailer);
        write_at(&second, "b1\n", 200);
        drain(&mut tailer);

        write_at(&first, "a2\n", 300);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["a1", "b1", "a2"]);
        let cursor = tailer.cursor().unwrap();
        assert_eq!(cursor.path(), first.as_path());
        assert!(!cursor.started_from_beginning());
        assert_eq!(cursor.offset(), 6);
    }

    #[test]
    fn replaced_abandoned_file_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("0001");
        let second = dir.path().join("0002");
        let (mut tailer, seen) = tailer(dir.path());
        tailer.step();

        write_at(&first, "a1\n", 100);
        drain(&mut tailer);
        write_at(&second, "b1\n", 200);
        drain(&mut tailer);

        // Renamed rather than removed so the new file cannot reuse its inode.
        fs::rename(&first, dir.path().join("0001.old")).unwrap();
        write_at(&first, "fresh 1\nfresh 2\n", 300);
        drain(&mut tailer);

        assert_eq!(*seen.borrow(), vec!["a1", "b1", "fresh 1", "fresh 2"]);
        assert!(tailer.cursor().unwrap().started_from_beginning());
    }

    /// Reports a root access error on its first call, then defers to the
    /// real directory.
    struct FailsFirstScan {
        inner: DirectoryWatcher,
        failed: std::cell::Cell<bool>,
    }

    impl Watcher for FailsFirstScan {
        fn latest_file(&self) -> Result<Option<PathBuf>, WatchError> {
            if !self.failed.replace(true) {
                return Err(WatchError::RootAccess {
                    path: self.inner.root().to_path_buf(),
                    source: std::io::Error::other("transient"),
                });
            }
            self.inner.latest_file()
        }
    }

    #[test]
    fn scan_error_before_first_open_does_not_replay_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0001");
        write_at(&path, "hist1\nhist2\nhist3\n", 100);

        let seen: Lines = Default::default();
        let sink = seen.clone();
        let watcher = FailsFirstScan {
            inner: DirectoryWatcher::new(dir.path()),
            failed: Default::default(),
        };
        let mut tailer = RotatingTailer::new(
            "test",
            watcher,
            move |line: &str| sink.borrow_mut().push(line.to_string()),
            POLL,
            IDLE,
        );

        assert_eq!(tailer.step(), Step::Wait(POLL));
        assert!(tailer.cursor().is_none());

        drain(&mut tailer);
        let cursor = tailer.cursor().unwrap();
        assert!(!cursor.started_from_beginning());
        assert_eq!(cursor.offset(), 18);
        assert!(seen.borrow().is_empty());

        write_at(&path, "new\n", 101);
        drain(&mut tailer);
        assert_eq!(*seen.borrow(), vec!["new"]);
    }

    #[test]
    fn run_returns_once_cancelled() {
        let dir = TempDir::new().unwrap();
        let (mut tailer, _seen) = tailer(dir.path());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let started = Instant::now();
        tailer.run(&shutdown);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
