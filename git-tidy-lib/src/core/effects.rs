//! Wrappers around various side effects.

use std::fmt::{Display, Write};
use std::io::{self, stderr, stdout, Stderr, Stdout, Write as WriteIo};
use std::mem::take;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bstr::ByteSlice;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use lazy_static::lazy_static;
use tracing::warn;

use crate::core::formatting::Glyphs;

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationType {
    CreatePullRequest,
    FetchUpstream,
    PushBranch,
    QueryForge,
    QueryWorkingCopy,
    RebaseOntoUpstream,
    RunGitCommand(Arc<String>),
    RunTool(Arc<String>),
    SquashCommits,
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::CreatePullRequest => write!(f, "Creating pull request"),
            OperationType::FetchUpstream => write!(f, "Fetching upstream"),
            OperationType::PushBranch => write!(f, "Pushing branch"),
            OperationType::QueryForge => write!(f, "Querying forge"),
            OperationType::QueryWorkingCopy => write!(f, "Querying the working copy"),
            OperationType::RebaseOntoUpstream => write!(f, "Rebasing onto upstream"),
            OperationType::RunGitCommand(command) => {
                write!(f, "Running Git command: {}", &command)
            }
            OperationType::RunTool(command) => write!(f, "Running command: {command}"),
            OperationType::SquashCommits => write!(f, "Squashing commits"),
        }
    }
}

#[derive(Clone, Debug)]
enum OutputDest {
    Stdout,
    Suppress,
    BufferForTest {
        stdout: Arc<Mutex<Vec<u8>>>,
        stderr: Arc<Mutex<Vec<u8>>>,
    },
}

/// The string values associated with [`OperationIcon`]s.
pub mod icons {
    /// Used to indicate success.
    pub const CHECKMARK: &str = "✓";

    /// Used to indicate a warning.
    pub const EXCLAMATION: &str = "!";

    /// Used to indicate failure.
    ///
    /// Can't use "✗️" in interactive progress meters because some terminals think its width is >1,
    /// which seems to cause rendering issues because we use 1 as its width.
    pub const CROSS: &str = "X";
}

#[derive(Debug)]
struct OperationState {
    operation_key: Vec<OperationType>,
    progress_bar: ProgressBar,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct RootOperation {
    multi_progress: MultiProgress,
    operations: Vec<OperationState>,
}

impl RootOperation {
    fn start(&mut self, operation_key: &[OperationType]) {
        lazy_static! {
            static ref SPINNER_STYLE: ProgressStyle = ProgressStyle::default_spinner()
                .template("{prefix}{spinner} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
        }

        let message = match operation_key.last() {
            Some(operation_type) => operation_type.to_string(),
            None => return,
        };
        let progress_bar = self.multi_progress.add(ProgressBar::new_spinner());
        progress_bar.set_style(SPINNER_STYLE.clone());
        progress_bar.set_prefix("  ".repeat(operation_key.len() - 1));
        progress_bar.set_message(message);
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        self.operations.push(OperationState {
            operation_key: operation_key.to_vec(),
            progress_bar,
            start_time: Instant::now(),
        });
    }

    fn finish(&mut self, operation_key: &[OperationType]) {
        // Remove the most recently started matching operation, so that
        // repeated operations of the same type unwind in order.
        let index = self
            .operations
            .iter()
            .rposition(|operation| operation.operation_key == operation_key);
        match index {
            Some(index) => {
                let OperationState {
                    operation_key: _,
                    progress_bar,
                    start_time,
                } = self.operations.remove(index);
                progress_bar.finish_and_clear();
                self.multi_progress.remove(&progress_bar);
                tracing::debug!(
                    ?operation_key,
                    elapsed_secs = start_time.elapsed().as_secs_f64(),
                    "Finished operation"
                );
            }
            None => {
                warn!(?operation_key, "Progress operation ended without matching start call");
            }
        }

        if self.operations.is_empty() && self.multi_progress.clear().is_err() {
            // Ignore error. Assume that the draw target is no longer available
            // to write to.
        }
    }
}

/// Wrapper around side-effectful operations, such as output and progress
/// indicators.
#[derive(Clone)]
pub struct Effects {
    glyphs: Glyphs,
    dest: OutputDest,
    operation_key: Vec<OperationType>,
    root_operation: Arc<Mutex<RootOperation>>,
}

impl std::fmt::Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Output fancy={}>",
            self.glyphs.should_write_ansi_escape_codes
        )
    }
}

impl Effects {
    /// Constructor. Writes to stdout.
    pub fn new(glyphs: Glyphs) -> Self {
        let root_operation = RootOperation {
            multi_progress: MultiProgress::with_draw_target(if console::user_attended_stderr() {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            }),
            operations: Default::default(),
        };
        Effects {
            glyphs,
            dest: OutputDest::Stdout,
            operation_key: Default::default(),
            root_operation: Arc::new(Mutex::new(root_operation)),
        }
    }

    /// Constructor. Suppresses all output.
    pub fn new_suppress_for_test(glyphs: Glyphs) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::Suppress,
            operation_key: Default::default(),
            root_operation: Default::default(),
        }
    }

    /// Constructor. Writes to the provided buffer.
    pub fn new_from_buffer_for_test(
        glyphs: Glyphs,
        stdout: &Arc<Mutex<Vec<u8>>>,
        stderr: &Arc<Mutex<Vec<u8>>>,
    ) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::BufferForTest {
                stdout: Arc::clone(stdout),
                stderr: Arc::clone(stderr),
            },
            operation_key: Default::default(),
            root_operation: Default::default(),
        }
    }

    /// Start reporting progress for the specified operation type.
    ///
    /// A progress spinner is shown until the returned `ProgressHandle` is
    /// dropped. Spinners are nested: starting an operation with the returned
    /// `Effects` renders it indented beneath its parent.
    pub fn start_operation(&self, operation_type: OperationType) -> (Effects, ProgressHandle<'_>) {
        let operation_key = {
            let mut result = self.operation_key.clone();
            result.push(operation_type);
            result
        };
        let progress = ProgressHandle {
            effects: self,
            operation_key: operation_key.clone(),
        };
        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::Suppress | OutputDest::BufferForTest { .. } => {
                return (self.clone(), progress)
            }
        }

        {
            let mut root_operation = self.lock_root_operation();
            root_operation.start(&operation_key);
        }

        let effects = Self {
            operation_key,
            ..self.clone()
        };
        (effects, progress)
    }

    fn lock_root_operation(&self) -> std::sync::MutexGuard<'_, RootOperation> {
        // A panic while holding the lock only affects progress display, so
        // keep going with whatever state was left behind.
        self.root_operation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_set_message(&self, operation_key: &[OperationType], message: String) {
        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::Suppress | OutputDest::BufferForTest { .. } => return,
        }

        let root_operation = self.lock_root_operation();
        if let Some(operation) = root_operation
            .operations
            .iter()
            .rev()
            .find(|operation| operation.operation_key == operation_key)
        {
            operation.progress_bar.set_message(message);
        }
    }

    fn on_drop_progress_handle(&self, operation_key: &[OperationType]) {
        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::Suppress | OutputDest::BufferForTest { .. } => return,
        }

        let mut root_operation = self.lock_root_operation();
        root_operation.finish(operation_key);
    }

    /// Get the set of glyphs associated with the output.
    pub fn get_glyphs(&self) -> &Glyphs {
        &self.glyphs
    }

    /// Create a stream that can be written to. The output might go to stdout or
    /// be rendered specially in the terminal.
    pub fn get_output_stream(&self) -> OutputStream {
        OutputStream {
            dest: self.dest.clone(),
            buffer: Default::default(),
            root_operation: Arc::clone(&self.root_operation),
        }
    }

    /// Create a stream that error output can be written to, rather than regular
    /// output.
    pub fn get_error_stream(&self) -> ErrorStream {
        ErrorStream {
            dest: self.dest.clone(),
            buffer: Default::default(),
            root_operation: Arc::clone(&self.root_operation),
        }
    }
}

trait WriteProgress {
    type Stream: WriteIo;
    fn get_stream() -> Self::Stream;
    fn get_buffer(&mut self) -> &mut String;
    fn get_root_operation(&self) -> Arc<Mutex<RootOperation>>;

    fn flush(&mut self) {
        let root_operation = self.get_root_operation();
        let root_operation = root_operation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if root_operation.operations.is_empty() || root_operation.multi_progress.is_hidden() {
            // There's no visible progress meters, so we can write directly to
            // the stream.
            let buffer = take(self.get_buffer());
            let mut stream = Self::get_stream();
            if write!(stream, "{buffer}").and_then(|()| stream.flush()).is_err() {
                // Ignore error. The stream may have been closed by the reader.
            }
            return;
        }

        // Use `MultiProgress::println` to render output above the progress
        // meters. We rely on buffering output because we can only print full
        // lines at a time.
        *self.get_buffer() = {
            let mut new_buffer = String::new();
            let lines = self.get_buffer().split_inclusive('\n').collect_vec();
            for line in lines {
                match line.strip_suffix('\n') {
                    Some(line) => {
                        if root_operation.multi_progress.println(line).is_err() {
                            // Ignore error; the draw target went away.
                        }
                    }
                    None => {
                        // This should only happen for the last element.
                        new_buffer.push_str(line);
                    }
                }
            }
            new_buffer
        };
    }

    fn drop(&mut self) {
        let buffer = self.get_buffer();
        if !buffer.is_empty() {
            // NB: when progress meters are visible, this only flushes
            // completely-written lines.
            self.flush();
        }
    }
}

/// A handle to stdout, but doesn't overwrite interactive progress notifications.
pub struct OutputStream {
    dest: OutputDest,
    buffer: String,
    root_operation: Arc<Mutex<RootOperation>>,
}

impl WriteProgress for OutputStream {
    type Stream = Stdout;

    fn get_stream() -> Self::Stream {
        stdout()
    }

    fn get_buffer(&mut self) -> &mut String {
        &mut self.buffer
    }

    fn get_root_operation(&self) -> Arc<Mutex<RootOperation>> {
        Arc::clone(&self.root_operation)
    }
}

impl Write for OutputStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(s);
                WriteProgress::flush(self);
            }

            OutputDest::Suppress => {
                // Do nothing.
            }

            OutputDest::BufferForTest { stdout, stderr: _ } => {
                let mut buffer = stdout.lock().map_err(|_| std::fmt::Error)?;
                buffer.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        WriteProgress::drop(self)
    }
}

/// A handle to stderr, but doesn't overwrite interactive progress notifications.
pub struct ErrorStream {
    dest: OutputDest,
    buffer: String,
    root_operation: Arc<Mutex<RootOperation>>,
}

impl WriteProgress for ErrorStream {
    type Stream = Stderr;

    fn get_stream() -> Self::Stream {
        stderr()
    }

    fn get_buffer(&mut self) -> &mut String {
        &mut self.buffer
    }

    fn get_root_operation(&self) -> Arc<Mutex<RootOperation>> {
        Arc::clone(&self.root_operation)
    }
}

impl Write for ErrorStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(s);
                WriteProgress::flush(self);
            }

            OutputDest::Suppress => {
                // Do nothing.
            }

            OutputDest::BufferForTest { stdout: _, stderr } => {
                let mut buffer = stderr.lock().map_err(|_| std::fmt::Error)?;
                buffer.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

/// You probably don't want this. This implementation is only for `tracing`'s `fmt_layer`, because
/// it needs a writer of type `io::Write`, but `Effects` normally uses its implementation of
/// `fmt::Write`.
impl io::Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(buf.to_str_lossy().as_ref());
                Ok(buf.len())
            }
            OutputDest::Suppress => {
                // Do nothing.
                Ok(buf.len())
            }
            OutputDest::BufferForTest { stdout: _, stderr } => {
                let mut buffer = stderr
                    .lock()
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "poisoned buffer"))?;
                buffer.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        WriteProgress::flush(self);
        Ok(())
    }
}

impl Drop for ErrorStream {
    fn drop(&mut self) {
        WriteProgress::drop(self);
    }
}

/// A handle to an operation in progress. This object should be kept live while
/// the operation is underway, and a spinner for it will be displayed in the
/// interactive progress display.
#[derive(Debug)]
pub struct ProgressHandle<'a> {
    effects: &'a Effects,
    operation_key: Vec<OperationType>,
}

impl Drop for ProgressHandle<'_> {
    fn drop(&mut self) {
        self.effects.on_drop_progress_handle(&self.operation_key)
    }
}

impl ProgressHandle<'_> {
    /// Update the message for this progress meter.
    pub fn notify_status(&self, message: impl Into<String>) {
        let message = message.into();
        self.effects.on_set_message(&self.operation_key, message);
    }
}
