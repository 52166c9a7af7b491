//! Chunked, parallel execution of the sliding-window pipeline.
//!
//! The merged chronological stream is cut into chunk files whenever the
//! elapsed time since the chunk started exceeds the window size. Each
//! chunk is scored by a worker that first replays the entire previous
//! chunk to warm its window, which the chunk cut guarantees covers
//! everything still in range. Workers share nothing; each builds its
//! own feature state. Their headerless CSV outputs are concatenated in
//! chunk order beneath a single header, so chunked and unchunked runs
//! produce identical files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use thiserror::Error;

use crate::dataset::{self, ChronologicalMerge, DatasetError, EventReader};
use crate::features::{FactoryError, FeatureFactory, InvalidEntryCounter};
use crate::window::WindowManager;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("no input datasets given")]
    NoInput,
    #[error("{} worker task(s) failed: {}", failures.len(), failures.join("; "))]
    WorkersFailed { failures: Vec<String> },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Everything one run needs. The factory is cloned into every worker.
pub struct RunParams {
    pub pr_datasets: Vec<PathBuf>,
    pub issue_datasets: Vec<PathBuf>,
    pub window_size: Option<Duration>,
    pub workers: usize,
    pub output_path: PathBuf,
    pub temp_dir: PathBuf,
    pub factory: FeatureFactory,
    /// Stop after this many chunks; a debugging aid for long runs.
    pub chunk_limit: Option<usize>,
}

/// What one worker reports back for its chunk.
struct ChunkReport {
    index: usize,
    rows: u64,
    invalid: InvalidEntryCounter,
    edges_added: Vec<(String, u64)>,
}

/// Aggregated results of a completed run.
pub struct RunSummary {
    pub rows: u64,
    pub chunks: usize,
    pub invalid: InvalidEntryCounter,
    /// Edge instances added to the collaboration graph per kind, summed
    /// over workers, warm-start replays excluded.
    pub edges_added: Vec<(String, u64)>,
}

struct ChunkTask {
    index: usize,
    previous: Option<PathBuf>,
    current: PathBuf,
}

pub fn run(params: RunParams) -> Result<RunSummary, PipelineError> {
    if params.pr_datasets.is_empty() && params.issue_datasets.is_empty() {
        return Err(PipelineError::NoInput);
    }
    fs::create_dir_all(&params.temp_dir).map_err(io_error(&params.temp_dir))?;

    let input_paths: Vec<PathBuf> = params
        .pr_datasets
        .iter()
        .chain(params.issue_datasets.iter())
        .cloned()
        .collect();
    let stream = ChronologicalMerge::open(&input_paths)?;
    let mut chunk_paths = split_chunks(stream, params.window_size, &params.temp_dir)?;
    if let Some(limit) = params.chunk_limit {
        chunk_paths.truncate(limit);
    }
    info!("processing {} chunk(s)", chunk_paths.len());

    let reports = run_workers(&params, &chunk_paths)?;

    let mut summary = RunSummary {
        rows: 0,
        chunks: chunk_paths.len(),
        invalid: InvalidEntryCounter::new(),
        edges_added: Vec::new(),
    };
    for report in &reports {
        summary.rows += report.rows;
        summary.invalid.merge(&report.invalid);
        merge_edge_counts(&mut summary.edges_added, &report.edges_added);
    }

    merge_chunk_outputs(&params, &chunk_paths)?;
    cleanup_temp_files(&chunk_paths, &params.temp_dir);

    Ok(summary)
}

/// Cuts the stream into NDJSON chunk files. A chunk ends when the next
/// event is more than one window size past the chunk's first event, so
/// the previous chunk always covers a full window for warm starts.
pub fn split_chunks<I>(
    stream: I,
    window_size: Option<Duration>,
    temp_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError>
where
    I: Iterator<Item = Result<crate::model::Event, DatasetError>>,
{
    let mut paths = Vec::new();
    let mut writer: Option<BufWriter<File>> = None;
    let mut chunk_start: Option<DateTime<Utc>> = None;

    for event in stream {
        let event = event?;
        let cut = match (window_size, chunk_start) {
            (Some(window), Some(start)) => event.closed_at - start > window,
            _ => false,
        };
        if cut || writer.is_none() {
            if let Some(mut finished) = writer.take() {
                finished.flush().map_err(io_error(temp_dir))?;
                debug!("finished chunk {}", paths.len() - 1);
            }
            let path = temp_dir.join(format!("chunk_{}", paths.len()));
            let file = File::create(&path).map_err(io_error(&path))?;
            writer = Some(BufWriter::new(file));
            paths.push(path);
            chunk_start = Some(event.closed_at);
        }
        if let Some(writer) = writer.as_mut() {
            let line = serde_json::to_string(&event).map_err(|source| DatasetError::Parse {
                path: temp_dir.to_path_buf(),
                line: 0,
                source,
            })?;
            writeln!(writer, "{line}").map_err(io_error(temp_dir))?;
        }
    }
    if let Some(mut finished) = writer.take() {
        finished.flush().map_err(io_error(temp_dir))?;
    }
    Ok(paths)
}

fn run_workers(
    params: &RunParams,
    chunk_paths: &[PathBuf],
) -> Result<Vec<ChunkReport>, PipelineError> {
    let tasks: Vec<ChunkTask> = chunk_paths
        .iter()
        .enumerate()
        .map(|(index, current)| ChunkTask {
            index,
            previous: index.checked_sub(1).map(|i| chunk_paths[i].clone()),
            current: current.clone(),
        })
        .collect();
    let task_count = tasks.len();

    let (task_sender, task_receiver) = bounded::<ChunkTask>(task_count.max(1));
    let (report_sender, report_receiver) =
        bounded::<Result<ChunkReport, (usize, PipelineError)>>(task_count.max(1));

    for task in tasks {
        // Channel capacity covers every task, so this never blocks.
        let _ = task_sender.send(task);
    }
    drop(task_sender);

    let worker_count = params.workers.max(1).min(task_count.max(1));
    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let tasks = task_receiver.clone();
        let reports = report_sender.clone();
        let factory = params.factory.clone();
        let window_size = params.window_size;
        let temp_dir = params.temp_dir.clone();
        handles.push(thread::spawn(move || {
            worker_loop(worker_id, tasks, reports, factory, window_size, &temp_dir);
        }));
    }
    drop(report_sender);

    let mut reports = Vec::with_capacity(task_count);
    let mut failures = Vec::new();
    for result in report_receiver.iter() {
        match result {
            Ok(report) => reports.push(report),
            Err((index, error)) => failures.push(format!("chunk {index}: {error}")),
        }
    }
    let mut panicked = 0usize;
    for handle in handles {
        if handle.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        failures.push(format!("{panicked} worker thread(s) panicked"));
    }
    // A report can only be missing when a worker died mid-task; never
    // merge a partial chunk output into the final dataset.
    if failures.is_empty() && reports.len() != task_count {
        failures.push(format!(
            "{} of {task_count} chunk report(s) missing",
            task_count - reports.len()
        ));
    }

    if !failures.is_empty() {
        failures.sort();
        return Err(PipelineError::WorkersFailed { failures });
    }
    reports.sort_by_key(|r| r.index);
    Ok(reports)
}

fn worker_loop(
    worker_id: usize,
    tasks: Receiver<ChunkTask>,
    reports: Sender<Result<ChunkReport, (usize, PipelineError)>>,
    factory: FeatureFactory,
    window_size: Option<Duration>,
    temp_dir: &Path,
) {
    for task in tasks.iter() {
        let index = task.index;
        debug!("worker {worker_id}: starting chunk {index}");
        let outcome = process_chunk(task, &factory, window_size, temp_dir);
        match &outcome {
            Ok(report) => {
                info!("worker {worker_id}: chunk {index} done, {} row(s)", report.rows)
            }
            Err(error) => warn!("worker {worker_id}: chunk {index} failed: {error}"),
        }
        if reports.send(outcome.map_err(|e| (index, e))).is_err() {
            return;
        }
    }
}

fn chunk_output_path(temp_dir: &Path, index: usize) -> PathBuf {
    temp_dir.join(format!("chunk_{index}_out"))
}

fn process_chunk(
    task: ChunkTask,
    factory: &FeatureFactory,
    window_size: Option<Duration>,
    temp_dir: &Path,
) -> Result<ChunkReport, PipelineError> {
    let mut set = factory.build()?;
    let mut window = WindowManager::new(window_size);

    if let Some(previous) = &task.previous {
        for event in EventReader::open(previous)? {
            window.warm_start(&mut set, event?);
        }
    }
    // Warm-start replays are bookkeeping noise; only edges added while
    // scoring this chunk count.
    let edge_baseline = set
        .graph
        .as_ref()
        .map(|graph| graph.borrow().added_report())
        .unwrap_or_default();

    let output_path = chunk_output_path(temp_dir, task.index);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&output_path)?;

    let mut invalid = InvalidEntryCounter::new();
    let mut rows = 0u64;
    for event in EventReader::open(&task.current)? {
        let event = event?;
        let scored = event.is_pull_request().then(|| event.clone());
        if let Some(values) = window.process(&mut set, event, &mut invalid) {
            if let Some(scored) = &scored {
                writer.write_record(dataset::row(scored, &values))?;
                rows += 1;
            }
        }
    }
    writer.flush().map_err(io_error(&output_path))?;

    let edges_added = set
        .graph
        .as_ref()
        .map(|graph| {
            graph
                .borrow()
                .added_report()
                .into_iter()
                .zip(edge_baseline)
                .map(|((label, total), (_, before))| (label.to_string(), total - before))
                .collect()
        })
        .unwrap_or_default();

    Ok(ChunkReport {
        index: task.index,
        rows,
        invalid,
        edges_added,
    })
}

fn merge_edge_counts(total: &mut Vec<(String, u64)>, delta: &[(String, u64)]) {
    for (label, count) in delta {
        match total.iter_mut().find(|(existing, _)| existing == label) {
            Some((_, existing)) => *existing += count,
            None => total.push((label.clone(), *count)),
        }
    }
}

/// Writes the final dataset: one header row, then every chunk's rows in
/// chunk order.
fn merge_chunk_outputs(params: &RunParams, chunk_paths: &[PathBuf]) -> Result<(), PipelineError> {
    let names = params.factory.build()?.output_names();

    let output = File::create(&params.output_path).map_err(io_error(&params.output_path))?;
    let mut output = BufWriter::new(output);
    {
        let mut header_writer = csv::Writer::from_writer(&mut output);
        header_writer.write_record(dataset::header(&names))?;
        header_writer.flush().map_err(io_error(&params.output_path))?;
    }
    for index in 0..chunk_paths.len() {
        let path = chunk_output_path(&params.temp_dir, index);
        let mut chunk = File::open(&path).map_err(io_error(&path))?;
        io::copy(&mut chunk, &mut output).map_err(io_error(&params.output_path))?;
    }
    output.flush().map_err(io_error(&params.output_path))?;
    info!("wrote {}", params.output_path.display());
    Ok(())
}

fn cleanup_temp_files(chunk_paths: &[PathBuf], temp_dir: &Path) {
    for (index, path) in chunk_paths.iter().enumerate() {
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(chunk_output_path(temp_dir, index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::*;
    use crate::model::Event;

    fn stream(events: Vec<Event>) -> impl Iterator<Item = Result<Event, DatasetError>> {
        events.into_iter().map(Ok)
    }

    #[test]
    fn splits_when_elapsed_time_exceeds_window() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![
            pull_request(1, "a/app", 1, 10, 20),
            pull_request(2, "a/app", 5, 10, 20),
            // Day 9 is 8 days past day 1, past the 7-day window.
            pull_request(3, "a/app", 9, 10, 20),
            pull_request(4, "a/app", 10, 10, 20),
        ];
        let paths =
            split_chunks(stream(events), Some(Duration::days(7)), dir.path()).unwrap();
        assert_eq!(paths.len(), 2);

        let first: Vec<Event> = EventReader::open(&paths[0])
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(first.len(), 2);
        let second: Vec<Event> = EventReader::open(&paths[1])
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(second[0].id, 3);
    }

    #[test]
    fn unbounded_window_makes_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![
            pull_request(1, "a/app", 1, 10, 20),
            pull_request(2, "a/app", 28, 10, 20),
        ];
        let paths = split_chunks(stream(events), None, dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn failed_chunk_task_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let params = RunParams {
            pr_datasets: vec![dir.path().join("unused.ndjson")],
            issue_datasets: Vec::new(),
            window_size: Some(Duration::days(7)),
            workers: 2,
            output_path: dir.path().join("out.csv"),
            temp_dir: dir.path().to_path_buf(),
            factory: FeatureFactory::new(false, None),
            chunk_limit: None,
        };

        // The chunk file was never written, so its worker must report a
        // failure and the scheduler must refuse to produce a dataset.
        let missing = dir.path().join("chunk_0");
        let result = run_workers(&params, &[missing]);
        assert!(matches!(
            result,
            Err(PipelineError::WorkersFailed { .. })
        ));
    }

    #[test]
    fn empty_stream_makes_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = split_chunks(stream(Vec::new()), Some(Duration::days(7)), dir.path()).unwrap();
        assert!(paths.is_empty());
    }
}
