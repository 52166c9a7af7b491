//! Event stream input and dataset row output.
//!
//! Input datasets are newline-delimited JSON, one event per line,
//! sorted by `closed_at`. The reader enforces that ordering at
//! ingestion because every window guarantee downstream depends on it.
//! Multiple datasets (pull requests and issues retrieved separately)
//! are merged into one chronological stream before chunking.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::features::FeatureValue;
use crate::model::Event;

pub const PREAMBLE: [&str; 5] = ["ID", "Project Name", "Submitter ID", "PR Number", "Closed At"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed event at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("out-of-order event at {path}:{line}: {current} after {previous}")]
    OutOfOrder {
        path: PathBuf,
        line: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Streams events from one NDJSON dataset, validating that `closed_at`
/// never decreases.
pub struct EventReader<R> {
    path: PathBuf,
    reader: R,
    line: usize,
    last_seen: Option<DateTime<Utc>>,
}

impl EventReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(path, BufReader::new(file)))
    }
}

impl<R: BufRead> EventReader<R> {
    pub fn from_reader(path: &Path, reader: R) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
            line: 0,
            last_seen: None,
        }
    }

    fn read_event(&mut self) -> Option<Result<Event, DatasetError>> {
        let mut buffer = String::new();
        loop {
            buffer.clear();
            match self.reader.read_line(&mut buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(DatasetError::Io {
                        path: self.path.clone(),
                        source,
                    }))
                }
            }
            self.line += 1;
            if !buffer.trim().is_empty() {
                break;
            }
        }

        let event: Event = match serde_json::from_str(buffer.trim()) {
            Ok(event) => event,
            Err(source) => {
                return Some(Err(DatasetError::Parse {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }))
            }
        };

        if let Some(previous) = self.last_seen {
            if event.closed_at < previous {
                return Some(Err(DatasetError::OutOfOrder {
                    path: self.path.clone(),
                    line: self.line,
                    previous,
                    current: event.closed_at,
                }));
            }
        }
        self.last_seen = Some(event.closed_at);
        Some(Ok(event))
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<Event, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_event()
    }
}

/// K-way merge over individually sorted datasets, yielding one
/// chronological stream. Ties resolve in reader order, keeping the
/// merge deterministic.
pub struct ChronologicalMerge<R> {
    readers: Vec<EventReader<R>>,
    heads: Vec<Option<Event>>,
}

impl<R: BufRead> ChronologicalMerge<R> {
    pub fn new(readers: Vec<EventReader<R>>) -> Result<Self, DatasetError> {
        let mut heads = Vec::with_capacity(readers.len());
        let mut readers = readers;
        for reader in readers.iter_mut() {
            heads.push(reader.next().transpose()?);
        }
        Ok(Self { readers, heads })
    }
}

impl ChronologicalMerge<BufReader<File>> {
    pub fn open(paths: &[PathBuf]) -> Result<Self, DatasetError> {
        let readers = paths
            .iter()
            .map(|path| EventReader::open(path))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(readers)
    }
}

impl<R: BufRead> Iterator for ChronologicalMerge<R> {
    type Item = Result<Event, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next_index = self
            .heads
            .iter()
            .enumerate()
            .filter_map(|(i, head)| head.as_ref().map(|event| (i, event.closed_at)))
            .min_by_key(|(_, at)| *at)
            .map(|(i, _)| i)?;

        let event = self.heads[next_index].take();
        match self.readers[next_index].next().transpose() {
            Ok(refill) => self.heads[next_index] = refill,
            Err(error) => return Some(Err(error)),
        }
        event.map(Ok)
    }
}

/// Header row: preamble columns followed by the feature columns.
pub fn header(feature_names: &[String]) -> Vec<String> {
    PREAMBLE
        .iter()
        .map(|c| c.to_string())
        .chain(feature_names.iter().cloned())
        .collect()
}

/// One output record for a scored pull request.
pub fn row(event: &Event, values: &[FeatureValue]) -> Vec<String> {
    let submitter = event
        .submitter_id()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let mut record = vec![
        event.id.to_string(),
        event.project.clone(),
        submitter,
        event.number.to_string(),
        event.closed_at.format(TIMESTAMP_FORMAT).to_string(),
    ];
    record.extend(values.iter().map(|v| v.to_string()));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::*;
    use std::io::Cursor;

    fn reader_over(events: &[Event]) -> EventReader<Cursor<Vec<u8>>> {
        let mut buffer = Vec::new();
        for event in events {
            let line = serde_json::to_string(event).unwrap();
            buffer.extend_from_slice(line.as_bytes());
            buffer.push(b'\n');
        }
        EventReader::from_reader(Path::new("test.ndjson"), Cursor::new(buffer))
    }

    #[test]
    fn reads_events_in_order() {
        let events = vec![
            pull_request(1, "a/app", 1, 10, 20),
            issue(2, "a/app", 2, 10),
        ];
        let read: Vec<Event> = reader_over(&events).map(Result::unwrap).collect();
        assert_eq!(read, events);
    }

    #[test]
    fn rejects_out_of_order_streams() {
        let events = vec![
            pull_request(1, "a/app", 5, 10, 20),
            pull_request(2, "a/app", 3, 10, 20),
        ];
        let mut reader = reader_over(&events);
        assert!(reader.next().unwrap().is_ok());
        let error = reader.next().unwrap().unwrap_err();
        assert!(matches!(error, DatasetError::OutOfOrder { line: 2, .. }));
    }

    #[test]
    fn merge_interleaves_by_timestamp() {
        let prs = vec![
            pull_request(1, "a/app", 1, 10, 20),
            pull_request(3, "a/app", 4, 10, 20),
        ];
        let issues = vec![issue(2, "a/app", 2, 10), issue(4, "a/app", 6, 10)];

        let merge =
            ChronologicalMerge::new(vec![reader_over(&prs), reader_over(&issues)]).unwrap();
        let ids: Vec<i64> = merge.map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn merge_breaks_ties_in_reader_order() {
        let first = vec![pull_request(1, "a/app", 1, 10, 20)];
        let second = vec![issue(2, "a/app", 1, 10)];

        let merge =
            ChronologicalMerge::new(vec![reader_over(&first), reader_over(&second)]).unwrap();
        let ids: Vec<i64> = merge.map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn row_formats_preamble_and_values() {
        let event = pull_request(7, "a/app", 1, 10, 20);
        let record = row(&event, &[FeatureValue::Bool(true), FeatureValue::Missing]);
        assert_eq!(
            record,
            vec!["7", "a/app", "10", "7", "2019-01-01T12:00:00Z", "true", ""]
        );
    }

    #[test]
    fn header_prefixes_preamble() {
        let names = vec!["F1".to_string(), "F2".to_string()];
        assert_eq!(
            header(&names),
            vec!["ID", "Project Name", "Submitter ID", "PR Number", "Closed At", "F1", "F2"]
        );
    }
}
