use std::io::{self, BufRead, ErrorKind};

const ELLIPSIS: &[u8] = b"...";

/// Splits renderer output into logical lines.
///
/// A line ends at `\n` or `\r` (terminator dropped) or as soon as the pending
/// text ends in `...`: the renderer prints transient status such as
/// `filtering...` without any terminator. Pending text at end of stream is
/// flushed as a final line.
pub struct LogicalLines<R> {
    reader: R,
    pending: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> LogicalLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for LogicalLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            };

            if available.is_empty() {
                self.finished = true;
                if self.pending.is_empty() {
                    return None;
                }
                return Some(Ok(take_line(&mut self.pending)));
            }

            let mut used = 0;
            let mut line = None;
            for &byte in available {
                used += 1;
                match byte {
                    b'\n' | b'\r' => {
                        line = Some(take_line(&mut self.pending));
                        break;
                    }
                    _ => {
                        self.pending.push(byte);
                        if self.pending.ends_with(ELLIPSIS) {
                            line = Some(take_line(&mut self.pending));
                            break;
                        }
                    }
                }
            }
            self.reader.consume(used);

            if let Some(line) = line {
                return Some(Ok(line));
            }
        }
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}
