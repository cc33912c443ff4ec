use crossbeam_channel::Sender;
use std::{
    io::{BufReader, Read},
    thread::{self, JoinHandle},
};

/// Splits `chunk` on `\r` or `\n`, appending partial data to `pending` and
/// emitting every completed, non-empty line.
///
/// ffmpeg and tqdm redraw their status lines with a bare carriage return, so
/// `\r` has to terminate a line just like `\n` does.
pub fn drain_lines<F>(pending: &mut Vec<u8>, chunk: &[u8], mut emit: F)
where
    F: FnMut(String),
{
    for &byte in chunk {
        if byte == b'\r' || byte == b'\n' {
            if !pending.is_empty() {
                emit(String::from_utf8_lossy(pending).into_owned());
                pending.clear();
            }
        } else {
            pending.push(byte);
        }
    }
}

/// Reads `source` until EOF on its own thread, sending each line to `tx`.
pub fn spawn_line_reader<R>(source: R, tx: Sender<String>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut pending = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut receiver_gone = false;

        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            // Keep reading after the receiver hangs up so the child never
            // blocks on a full pipe.
            drain_lines(&mut pending, &chunk[..read], |line| {
                if !receiver_gone && tx.send(line).is_err() {
                    receiver_gone = true;
                }
            });
        }

        if !pending.is_empty() && !receiver_gone {
            let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
        }
    })
}
