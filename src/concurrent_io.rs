use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// The engine's output stream.  All task output ultimately lands here;
/// the mutex makes a buffered task flush one contiguous segment.
pub struct OutputSink {
    inner: Mutex<Box<dyn Write + Send>>,
}

impl OutputSink {
    pub fn stdout() -> OutputSink {
        OutputSink::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> OutputSink {
        OutputSink {
            inner: Mutex::new(writer),
        }
    }

    /// Write one contiguous segment.  Writes from two threads never
    /// interleave within a segment.
    pub fn write_segment(&self, bytes: &[u8]) {
        let mut writer = self.inner.lock().unwrap();
        let _ = writer.write_all(bytes);
        let _ = writer.flush();
    }

    pub fn write_line(&self, text: &str) {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        self.write_segment(&bytes);
    }
}

/// Per-task-execution output handle.
///
/// With output synchronization enabled the task's output accumulates in a
/// buffer and reaches the engine stream as a single segment when the task
/// finishes.  With synchronization disabled, writes pass straight through.
pub enum TaskIo {
    Buffered { sink: Arc<OutputSink>, buf: Vec<u8> },
    Direct { sink: Arc<OutputSink> },
}

impl TaskIo {
    pub fn new(sink: Arc<OutputSink>, sync_output: bool) -> TaskIo {
        if sync_output {
            TaskIo::Buffered {
                sink,
                buf: Vec::new(),
            }
        } else {
            TaskIo::Direct { sink }
        }
    }

    pub fn write_line(&mut self, text: &str) {
        let _ = self.write_all(text.as_bytes());
        let _ = self.write_all(b"\n");
    }

    /// Flush the buffer to the engine stream and close the handle.
    pub fn close(self) {
        if let TaskIo::Buffered { sink, buf } = self {
            if !buf.is_empty() {
                sink.write_segment(&buf);
            }
        }
    }
}

impl Write for TaskIo {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self {
            TaskIo::Buffered { buf, .. } => {
                buf.extend_from_slice(bytes);
                Ok(bytes.len())
            }
            TaskIo::Direct { sink } => {
                sink.write_segment(bytes);
                Ok(bytes.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `Write` adapter over the engine sink, for code that tees a child's
/// output outside any task.
pub struct SinkWriter(pub Arc<OutputSink>);

impl Write for SinkWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0.write_segment(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A writer over shared memory, for capturing engine output in tests.
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn new() -> SharedBuf {
            SharedBuf::default()
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
