use crate::error::SamError;
use log::debug;
use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

enum Sink {
    Plain(BufWriter<File>),
    Compressed(bgzf::io::Writer<File>),
    Stdout(BufWriter<io::Stdout>),
}

/// A `<path>.tmp` file that is removed on drop unless it was moved into place
struct Staged {
    tmp_path: PathBuf,
    final_path: PathBuf,
    persisted: bool,
}

impl Staged {
    fn persist(mut self) -> Result<(), SamError> {
        std::fs::rename(&self.tmp_path, &self.final_path).map_err(|e| {
            SamError::SinkUnavailable(format!(
                "Failed to move '{}' to '{}': {}",
                self.tmp_path.display(),
                self.final_path.display(),
                e
            ))
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        // Never finished: leave no half-written file behind
        if !self.persisted {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

/// An output file that only appears under its final name once `finish` succeeds.
///
/// Data goes to `<path>.tmp` first; paths ending in `.gz`/`.bgz` are BGZF
/// compressed; `-` writes straight to stdout.
pub struct OutputFile {
    sink: Sink,
    staged: Option<Staged>,
}

impl OutputFile {
    pub fn create(path: &str) -> Result<Self, SamError> {
        if path == "-" {
            return Ok(Self {
                sink: Sink::Stdout(BufWriter::new(io::stdout())),
                staged: None,
            });
        }

        let tmp_path = PathBuf::from(format!("{}.tmp", path));
        let file = File::create(&tmp_path).map_err(|e| {
            SamError::SinkUnavailable(format!("Failed to create '{}': {}", tmp_path.display(), e))
        })?;
        let staged = Staged {
            tmp_path,
            final_path: PathBuf::from(path),
            persisted: false,
        };

        let sink = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
            debug!("Writing BGZF-compressed output to {}", path);
            Sink::Compressed(bgzf::io::Writer::new(file))
        } else {
            Sink::Plain(BufWriter::new(file))
        };

        Ok(Self {
            sink,
            staged: Some(staged),
        })
    }

    /// Flush everything and move the file into place
    pub fn finish(self) -> Result<(), SamError> {
        let Self { sink, staged } = self;
        let target = staged
            .as_ref()
            .map_or_else(|| Path::new("-").to_path_buf(), |s| s.final_path.clone());
        let sink_error =
            |e: io::Error| SamError::SinkUnavailable(format!("Failed to write '{}': {}", target.display(), e));

        match sink {
            Sink::Plain(mut writer) => writer.flush().map_err(sink_error)?,
            // Consumes the writer so the EOF block is written exactly once
            Sink::Compressed(writer) => {
                writer.finish().map_err(sink_error)?;
            }
            Sink::Stdout(mut writer) => writer.flush().map_err(sink_error)?,
        }

        match staged {
            Some(staged) => staged.persist(),
            None => Ok(()),
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(writer) => writer.write(buf),
            Sink::Compressed(writer) => writer.write(buf),
            Sink::Stdout(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(writer) => writer.flush(),
            Sink::Compressed(writer) => writer.flush(),
            Sink::Stdout(writer) => writer.flush(),
        }
    }
}
