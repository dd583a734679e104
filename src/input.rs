use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Chunked reader over a file or stdin ("-").
pub struct InputReader {
    reader: Box<dyn Read>,
    bytes_read: u64,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();

        let reader: Box<dyn Read> = if path.as_os_str() == "-" {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(path)
                .with_context(|| format!("Cannot open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: Box<dyn Read>) -> Self {
        Self {
            reader,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let n = match self.reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.bytes_read += n as u64;

            if !callback(&buffer[..n])? {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_in_chunks_until_stopped() -> Result<()> {
        let data = (0..=255u8).collect::<Vec<_>>();
        let mut reader = InputReader::from_reader(Box::new(io::Cursor::new(data)));

        let mut sizes = Vec::new();
        reader.process_chunks(100, |chunk| {
            sizes.push(chunk.len());
            Ok(true)
        })?;
        assert_eq!(sizes, [100, 100, 56]);
        assert_eq!(reader.bytes_read(), 256);

        let mut reader = InputReader::from_reader(Box::new(io::Cursor::new(vec![0u8; 300])));
        let mut calls = 0;
        reader.process_chunks(100, |_| {
            calls += 1;
            Ok(false)
        })?;
        assert_eq!(calls, 1);
        assert_eq!(reader.bytes_read(), 100);

        Ok(())
    }
}
