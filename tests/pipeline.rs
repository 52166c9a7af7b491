//! End-to-end pipeline tests: the chunked parallel run must reproduce a
//! single-pass run byte for byte, and the window must prune exactly.

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ecomine::chunks::{self, RunParams};
use ecomine::dataset::{self, ChronologicalMerge};
use ecomine::deps::ProjectFilter;
use ecomine::features::ecosystem::{EcosystemExperience, EcosystemMetric};
use ecomine::features::{
    Feature, FeatureFactory, FeatureValue, InvalidEntryCounter, SlidingWindowFeature,
};
use ecomine::model::{Actor, Comment, Event, EventKind};
use ecomine::window::WindowManager;

fn ts(day: i64, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 1, hour, 0, 0).unwrap() + Duration::days(day - 1)
}

fn pull_request(id: i64, project: &str, closed_at: DateTime<Utc>, submitter: i64, merger: i64) -> Event {
    Event {
        id,
        kind: EventKind::PullRequest,
        project: project.to_string(),
        number: id,
        created_at: closed_at - Duration::hours(8),
        closed_at,
        merged: Some(id % 3 != 0),
        user: Some(Actor { id: submitter, login: None }),
        merged_by: Some(Actor { id: merger, login: None }),
        closed_by: Some(Actor { id: merger, login: None }),
        comments: 0,
        comments_data: None,
        commits: Some(2),
        title: Some(format!("pr-{id} #change")),
        body: None,
    }
}

fn issue(id: i64, project: &str, closed_at: DateTime<Utc>, submitter: i64) -> Event {
    Event {
        id,
        kind: EventKind::Issue,
        project: project.to_string(),
        number: id,
        created_at: closed_at - Duration::hours(3),
        closed_at,
        merged: None,
        user: Some(Actor { id: submitter, login: None }),
        merged_by: None,
        closed_by: Some(Actor { id: submitter, login: None }),
        comments: 0,
        comments_data: None,
        commits: None,
        title: Some(format!("issue-{id}")),
        body: None,
    }
}

fn with_comments(mut event: Event, commenters: &[i64]) -> Event {
    event.comments = commenters.len() as u32;
    event.comments_data = Some(
        commenters
            .iter()
            .map(|&id| Comment {
                user: Actor { id, login: None },
                created_at: event.closed_at - Duration::hours(1),
            })
            .collect(),
    );
    event
}

/// Forty days of interleaved activity across three projects and a small
/// actor pool, enough to force several chunk cuts at a 7-day window.
fn sample_streams() -> (Vec<Event>, Vec<Event>) {
    let projects = ["acme/app", "acme/lib", "third/tool"];
    let mut prs = Vec::new();
    let mut issues = Vec::new();
    let mut id = 1i64;
    for day in 1..=40i64 {
        let project = projects[(day as usize) % projects.len()];
        let submitter = 10 + (id % 4);
        let merger = 20 + (id % 3);
        let mut pr = pull_request(id, project, ts(day, 10), submitter, merger);
        if day % 2 == 0 {
            pr = with_comments(pr, &[30 + (id % 2), submitter]);
        }
        prs.push(pr);
        id += 1;

        if day % 3 == 0 {
            let reporter = 10 + (id % 5);
            let event = with_comments(
                issue(id, project, ts(day, 15), reporter),
                &[20 + (id % 3), 30],
            );
            issues.push(event);
            id += 1;
        }
    }
    (prs, issues)
}

fn write_ndjson(path: &PathBuf, events: &[Event]) {
    let mut lines = String::new();
    for event in events {
        lines.push_str(&serde_json::to_string(event).unwrap());
        lines.push('\n');
    }
    std::fs::write(path, lines).unwrap();
}

fn read_csv(path: &PathBuf) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|record| {
            record
                .unwrap()
                .iter()
                .map(|field| field.to_string())
                .collect()
        })
        .collect()
}

#[test]
fn chunked_run_matches_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let pr_path = dir.path().join("prs.ndjson");
    let issue_path = dir.path().join("issues.ndjson");
    let (prs, issues) = sample_streams();
    write_ndjson(&pr_path, &prs);
    write_ndjson(&issue_path, &issues);

    let window_size = Some(Duration::days(7));
    let factory = FeatureFactory::new(true, None);

    // Reference: one pass over the merged stream, no chunking.
    let mut set = factory.build().unwrap();
    let mut window = WindowManager::new(window_size);
    let mut invalid = InvalidEntryCounter::new();
    let mut expected = vec![dataset::header(&set.output_names())];
    let merged = ChronologicalMerge::open(&[pr_path.clone(), issue_path.clone()]).unwrap();
    for event in merged {
        let event = event.unwrap();
        let scored = event.is_pull_request().then(|| event.clone());
        if let Some(values) = window.process(&mut set, event, &mut invalid) {
            expected.push(dataset::row(&scored.unwrap(), &values));
        }
    }
    assert!(expected.len() > 30);

    // Chunked, multi-worker run over the same inputs.
    let output_path = dir.path().join("out.csv");
    let summary = chunks::run(RunParams {
        pr_datasets: vec![pr_path],
        issue_datasets: vec![issue_path],
        window_size,
        workers: 4,
        output_path: output_path.clone(),
        temp_dir: dir.path().join("chunks"),
        factory,
        chunk_limit: None,
    })
    .unwrap();

    assert!(summary.chunks > 1, "stream should split into several chunks");
    assert_eq!(summary.rows as usize, expected.len() - 1);

    let actual = read_csv(&output_path);
    assert_eq!(actual, expected);
}

#[test]
fn single_worker_and_many_workers_agree() {
    let dir = tempfile::tempdir().unwrap();
    let pr_path = dir.path().join("prs.ndjson");
    let (prs, _) = sample_streams();
    write_ndjson(&pr_path, &prs);

    let mut outputs = Vec::new();
    for workers in [1, 3] {
        let output_path = dir.path().join(format!("out_{workers}.csv"));
        chunks::run(RunParams {
            pr_datasets: vec![pr_path.clone()],
            issue_datasets: Vec::new(),
            window_size: Some(Duration::days(7)),
            workers,
            output_path: output_path.clone(),
            temp_dir: dir.path().join(format!("chunks_{workers}")),
            factory: FeatureFactory::new(true, None),
            chunk_limit: None,
        })
        .unwrap();
        outputs.push(std::fs::read_to_string(&output_path).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

// Three pull requests, 7-day window: a submission from ten days before
// the scored event must be gone, one from five days before must remain,
// and the scored event itself never counts toward its own features.
#[test]
fn window_scenario_prunes_and_scores_as_specified() {
    let actor_a = 1;
    let actor_b = 2;
    let actor_c = 3;

    let pr1 = pull_request(1, "org/p", ts(1, 12), actor_a, actor_b);
    let pr2 = pull_request(2, "org/p", ts(6, 12), actor_a, actor_b);
    let pr3 = pull_request(3, "org/q", ts(11, 12), actor_c, actor_a);

    let factory = FeatureFactory::new(false, None);
    let mut set = factory.build().unwrap();
    let names = set.output_names();
    let mut window = WindowManager::new(Some(Duration::days(7)));
    let mut invalid = InvalidEntryCounter::new();

    window.process(&mut set, pr1, &mut invalid);
    window.process(&mut set, pr2.clone(), &mut invalid);
    assert_eq!(window.len(), 2);

    let row = window.process(&mut set, pr3, &mut invalid).unwrap();
    // Processing pr3 pruned pr1 (ten days old) but kept pr2 (five days).
    assert_eq!(window.len(), 2);

    let index = names
        .iter()
        .position(|n| n == "IntraProjectSubmitterPullRequestSubmissionCount")
        .unwrap();
    assert_eq!(row[index], FeatureValue::Int(0));

    // Ecosystem experience for actor A at pr3 time: pr2 (project org/p)
    // counts, the pruned pr1 and the current project never do.
    let mut eco = EcosystemExperience::new(
        "EcosystemPullRequestSubmissions",
        EcosystemMetric::SubmissionCount,
        ProjectFilter::ecosystem(),
    );
    eco.add(&pr2);
    let probe = pull_request(4, "org/q", ts(11, 13), actor_a, actor_b);
    assert_eq!(eco.measure(&probe), vec![FeatureValue::Int(1)]);
}
