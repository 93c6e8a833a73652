use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use serde_json::Value;

use super::Envelope;
use crate::error::Result;

/// Records parsed from the capture buffer plus the offset to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamBatch {
    pub envelopes: Vec<Envelope>,
    pub next_offset: u64,
    /// The stream's `done` event has been captured.
    pub done: bool,
}

/// Classification of one captured SSE line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Data(Value),
    Done,
    Skip,
}

/// Parse one SSE line. Only `data:` lines carry records; comments,
/// keep-alives, `id:`/`retry:` fields and empty or `{}` payloads are skipped.
pub fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return StreamLine::Skip;
    }
    if let Some(name) = line.strip_prefix("event:") {
        return if name.trim() == "done" {
            StreamLine::Done
        } else {
            StreamLine::Skip
        };
    }
    let Some(payload) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "{}" {
        return StreamLine::Skip;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) if map.is_empty() => StreamLine::Skip,
        Ok(value) => StreamLine::Data(value),
        Err(_) => StreamLine::Skip,
    }
}

/// Read complete lines after `offset`. A trailing line without its newline
/// belongs to a frame still being written and is left for the next call.
pub fn read_stream_buffer(path: &Path, offset: u64) -> Result<StreamBatch> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(StreamBatch {
                envelopes: Vec::new(),
                next_offset: offset,
                done: false,
            })
        }
        Err(err) => return Err(err.into()),
    };

    // A buffer shorter than the cursor was recreated; never move backwards.
    let len = file.metadata()?.len();
    if len <= offset {
        return Ok(StreamBatch {
            envelopes: Vec::new(),
            next_offset: offset,
            done: false,
        });
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut bytes)?;

    let consumed = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(last_newline) => last_newline + 1,
        None => 0,
    };

    let mut envelopes = Vec::new();
    let mut done = false;
    for line in String::from_utf8_lossy(&bytes[..consumed]).lines() {
        match parse_stream_line(line) {
            StreamLine::Data(value) => envelopes.push(Envelope::from_value(value)),
            StreamLine::Done => done = true,
            StreamLine::Skip => {}
        }
    }

    Ok(StreamBatch {
        envelopes,
        next_offset: offset + consumed as u64,
        done,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::RecordLevel;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn only_data_lines_produce_records() {
        assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(parse_stream_line("id: 7"), StreamLine::Skip);
        assert_eq!(parse_stream_line("data: {}"), StreamLine::Skip);
        assert_eq!(parse_stream_line("data:"), StreamLine::Skip);
        assert_eq!(parse_stream_line("data: { }"), StreamLine::Skip);
        assert_eq!(parse_stream_line("event: done"), StreamLine::Done);
        assert_eq!(
            parse_stream_line("data: {\"level\":\"observation\"}\r"),
            StreamLine::Data(json!({"level": "observation"}))
        );
    }

    #[test]
    fn partial_trailing_line_is_left_for_the_next_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.buffer");
        let mut file = File::create(&path).unwrap();
        let first = "data: {\"level\":\"observation\",\"data\":{\"event\":\"chat\"}}\n\n";
        file.write_all(first.as_bytes()).unwrap();
        file.write_all(b"data: {\"level\":\"observ").unwrap();
        file.flush().unwrap();

        let batch = read_stream_buffer(&path, 0).unwrap();
        assert_eq!(batch.envelopes.len(), 1);
        assert_eq!(batch.next_offset, first.len() as u64);

        file.write_all(b"ation\",\"data\":{\"event\":\"idle\"}}\n").unwrap();
        file.flush().unwrap();
        let batch = read_stream_buffer(&path, batch.next_offset).unwrap();
        assert_eq!(batch.envelopes.len(), 1);
        assert_eq!(batch.envelopes[0].data, json!({"event": "idle"}));
        assert_eq!(batch.envelopes[0].level, RecordLevel::Observation);
    }

    #[test]
    fn reading_the_same_offset_twice_redelivers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.buffer");
        std::fs::write(
            &path,
            "data: {\"level\":\"init_call\",\"data\":{\"task\":\"t\"}}\n\nevent: done\ndata: {}\n",
        )
        .unwrap();
        let a = read_stream_buffer(&path, 0).unwrap();
        let b = read_stream_buffer(&path, 0).unwrap();
        assert_eq!(a, b);
        assert!(a.done);
        assert!(a.envelopes[0].is_init_call());
    }

    #[test]
    fn missing_buffer_keeps_the_offset() {
        let dir = TempDir::new().unwrap();
        let batch = read_stream_buffer(&dir.path().join("none"), 42).unwrap();
        assert!(batch.envelopes.is_empty());
        assert_eq!(batch.next_offset, 42);
    }
}
