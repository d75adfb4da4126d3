//! Lifecycle contract tests: state machine policy, stop idempotency,
//! concurrent stops, and drop safety.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use siphon::testing::{ReadStep, RecordingConsumer, ScriptedDescriptor};
use siphon::{FileReader, ReaderError, ReaderState, Terminal};

fn rank(state: ReaderState) -> u8 {
    match state {
        ReaderState::NotStarted => 0,
        ReaderState::Reading => 1,
        ReaderState::Terminating => 2,
        ReaderState::TerminatedNormally | ReaderState::TerminatedAbnormally => 3,
    }
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn states_progress_monotonically_to_normal_termination() {
    let (descriptor, _probe) = ScriptedDescriptor::with_chunks([b"abc".to_vec(), b"def".to_vec()]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    let mut observed = vec![reader.state()];
    assert_eq!(observed[0], ReaderState::NotStarted);

    reader.start_reading().await.unwrap();
    observed.push(reader.state());

    let terminal = reader.completed().await;
    observed.push(reader.state());

    assert_eq!(terminal, Terminal::Normal);
    assert_eq!(*observed.last().unwrap(), ReaderState::TerminatedNormally);
    // Never regresses, and passes through Reading before any terminal.
    assert!(observed.windows(2).all(|w| rank(w[0]) <= rank(w[1])));
    assert!(observed.contains(&ReaderState::Reading) || observed[1].is_terminal());
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn second_start_is_an_invalid_state_error() {
    let (descriptor, _probe) = ScriptedDescriptor::new([ReadStep::Stall]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    reader.start_reading().await.unwrap();
    match reader.start_reading().await {
        Err(ReaderError::InvalidState { operation, .. }) => {
            assert_eq!(operation, "start_reading");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    reader.stop_reading().await.unwrap();
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn start_after_termination_reports_already_terminated() {
    let (descriptor, _probe) = ScriptedDescriptor::with_chunks([b"x".to_vec()]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    reader.start_reading().await.unwrap();
    assert_eq!(reader.completed().await, Terminal::Normal);

    match reader.start_reading().await {
        Err(ReaderError::AlreadyTerminated(terminal)) => {
            assert_eq!(terminal, Terminal::Normal);
        }
        other => panic!("expected AlreadyTerminated, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_before_start_is_an_invalid_state_error() {
    let (descriptor, probe) = ScriptedDescriptor::new([ReadStep::Stall]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    match reader.stop_reading().await {
        Err(ReaderError::InvalidState { operation, state }) => {
            assert_eq!(operation, "stop_reading");
            assert_eq!(state, ReaderState::NotStarted);
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    // Never started: the reader still owns (and on drop closes) the descriptor.
    drop(reader);
    assert_eq!(probe.close_count(), 1);
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent_after_termination() {
    let (descriptor, _probe) = ScriptedDescriptor::with_chunks([b"x".to_vec()]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    reader.start_reading().await.unwrap();
    assert_eq!(reader.completed().await, Terminal::Normal);

    assert_eq!(reader.stop_reading().await.unwrap(), Terminal::Normal);
    assert_eq!(reader.stop_reading().await.unwrap(), Terminal::Normal);
    assert_eq!(reader.state(), ReaderState::TerminatedNormally);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_stops_all_agree_on_the_terminal_state() {
    let (descriptor, probe) = ScriptedDescriptor::new([ReadStep::Stall]);
    let consumer = RecordingConsumer::new();
    let reader = Arc::new(FileReader::from_descriptor(descriptor, consumer));

    reader.start_reading().await.unwrap();

    let mut stops = Vec::new();
    for _ in 0..8 {
        let reader = Arc::clone(&reader);
        stops.push(tokio::spawn(async move { reader.stop_reading().await }));
    }

    for stop in stops {
        assert_eq!(stop.await.unwrap().unwrap(), Terminal::Normal);
    }
    assert_eq!(probe.close_count(), 1);
    assert_eq!(reader.state(), ReaderState::TerminatedNormally);
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn dropping_without_stop_still_closes_and_completes() {
    let (descriptor, probe) = ScriptedDescriptor::new([ReadStep::Stall]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor(descriptor, consumer);

    reader.start_reading().await.unwrap();
    let completion = reader.completion();
    drop(reader);

    // The detached handle outlives the reader and still resolves.
    assert_eq!(completion.wait().await, Terminal::Normal);
    assert_eq!(probe.close_count(), 1);
}

#[rstest]
#[timeout(Duration::from_secs(2))]
#[tokio::test(flavor = "multi_thread")]
async fn parent_cancellation_stops_the_reader() {
    use siphon::ReaderOptions;
    use tokio_util::sync::CancellationToken;

    let parent = CancellationToken::new();
    let (descriptor, probe) = ScriptedDescriptor::new([ReadStep::Stall]);
    let consumer = RecordingConsumer::new();
    let reader = FileReader::from_descriptor_with_options(
        descriptor,
        consumer,
        ReaderOptions {
            cancel: Some(parent.clone()),
            ..ReaderOptions::default()
        },
    );

    reader.start_reading().await.unwrap();
    parent.cancel();

    assert_eq!(reader.completed().await, Terminal::Normal);
    assert_eq!(probe.close_count(), 1);
}
