use atelier_common::jobs::{JobBoard, JobStatus, RunSummary};
use atelier_common::protocol::execute::{unwrap_candidate, StreamEvent};
use atelier_common::protocol::ndjson::LineDecoder;
use atelier_common::schema::validate_document;
use chrono::Utc;
use serde_json::json;

fn load_contract() -> String {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/execute-stream.ndjson");
    std::fs::read_to_string(path).expect("contract file should be readable")
}

/// Decode the contract in `piece`-byte reads.
fn decode(raw: &str, piece: usize) -> Vec<StreamEvent> {
    let mut decoder = LineDecoder::new();
    let mut lines = Vec::new();
    for chunk in raw.as_bytes().chunks(piece) {
        lines.extend(decoder.push(chunk));
    }
    lines.extend(decoder.finish());
    lines
        .iter()
        .map(|line| serde_json::from_str(line).expect("contract line should decode"))
        .collect()
}

#[test]
fn framing_is_independent_of_read_size() {
    let raw = load_contract();
    let whole = decode(&raw, raw.len());
    for piece in [1, 7, 64, 333] {
        assert_eq!(decode(&raw, piece), whole, "read size {piece} changed the events");
    }
    assert_eq!(whole.len(), 8);
    assert!(whole.last().expect("contract should not be empty").is_terminal());
}

#[test]
fn contract_stream_drives_the_job_board() {
    let mut board = JobBoard::new();
    let mut summary = None;
    for event in decode(&load_contract(), 4096) {
        let now = Utc::now();
        match event {
            StreamEvent::Plan { paths } => board
                .declare(paths.into_iter().map(|c| (c.index, c.path)))
                .expect("plan should declare jobs"),
            StreamEvent::ChunkStart { index } => {
                board.start(index, now).expect("start should be valid");
            }
            StreamEvent::ChunkComplete { index, ok, ms, error } => {
                board.complete(index, ok, ms, error, now).expect("complete should be valid");
            }
            StreamEvent::Result { success, enhanced_data, metadata, .. } => {
                assert!(success);
                let candidate = unwrap_candidate(enhanced_data.expect("result should carry data"))
                    .expect("candidate should unwrap");
                validate_document(&candidate).expect("candidate should validate");
                assert_eq!(candidate["colors"], json!({ "primary": "#E76F51" }));
                summary = Some(RunSummary::finalize(&board, &metadata, now));
            }
            StreamEvent::Error { message } => panic!("unexpected error event: {message}"),
        }
    }

    let summary = summary.expect("contract should end with a result");
    assert_eq!(summary.chunks_planned, 3);
    assert_eq!(summary.chunks_succeeded, 1);
    assert_eq!(summary.chunks_failed, 2);
    assert_eq!(summary.failed_real(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.planner_ms, Some(641));
    assert_eq!(summary.executor_ms, Some(2410));
    assert_eq!(board.get(0).map(|job| (job.status, job.ms)), Some((JobStatus::Ok, Some(812))));
    assert_eq!(board.outstanding(), 0);
}
