use eventually_docstore::event::VersionSelect;
use eventually_docstore::stream::CheckpointError;
use eventually_docstore::version::ExpectedVersion;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

mod setup;

use setup::ProjectionState;

#[tokio::test]
async fn checkpoint_is_absent_until_written() {
    let (_, event_store) = setup::event_store();
    let token = CancellationToken::new();
    let id = setup::stream_id("account-1");

    event_store
        .write_to_stream(
            setup::batch(&id, ExpectedVersion::START_OF_STREAM, setup::deposits(1..=5)),
            &token,
        )
        .await
        .expect("events should be written");

    let checkpoint = event_store
        .read_checkpoint::<ProjectionState>("projA", &id, &token)
        .await
        .expect("checkpoint should be read");

    assert!(checkpoint.is_none());

    event_store
        .write_checkpoint("projA", &id, 5, Some(ProjectionState { count: 10 }), &token)
        .await
        .expect("checkpoint should be written");

    let checkpoint = event_store
        .read_checkpoint::<ProjectionState>("projA", &id, &token)
        .await
        .expect("checkpoint should be read")
        .expect("checkpoint should exist");

    assert_eq!(5, checkpoint.position);
    assert_eq!(Some(ProjectionState { count: 10 }), checkpoint.state);
    assert_eq!(id, checkpoint.stream_id);
}

#[tokio::test]
async fn checkpoints_can_not_be_ahead_of_the_stream() {
    let (_, event_store) = setup::event_store();
    let token = CancellationToken::new();
    let id = setup::stream_id("account-2");

    let err = event_store
        .write_checkpoint::<ProjectionState>("projA", &id, 1, None, &token)
        .await
        .expect_err("the stream has no events");

    assert!(matches!(
        err,
        CheckpointError::PositionAhead {
            position: 1,
            current: 0
        }
    ));

    // Position zero means nothing has been processed yet, which is always valid.
    event_store
        .write_checkpoint::<ProjectionState>("projA", &id, 0, None, &token)
        .await
        .expect("an empty checkpoint should be written");
}

#[tokio::test]
async fn consumers_process_events_after_their_checkpoint() {
    let (_, event_store) = setup::event_store();
    let token = CancellationToken::new();
    let id = setup::stream_id("account-3");

    event_store
        .write_to_stream(
            setup::batch(&id, ExpectedVersion::START_OF_STREAM, setup::deposits([5, 10])),
            &token,
        )
        .await
        .expect("events should be written");

    // First run, everything is processed and checkpointed.
    let mut state = ProjectionState::default();
    let mut position = 0;

    let events: Vec<_> = event_store
        .read_from_stream(&id, VersionSelect::All, &token)
        .try_collect()
        .await
        .expect("stream should be read");

    for event in events {
        state.count += 1;
        position = event.version;
    }

    event_store
        .write_checkpoint("balance", &id, position, Some(state), &token)
        .await
        .expect("checkpoint should be written");

    event_store
        .write_to_stream(setup::batch(&id, 2, setup::deposits([20])), &token)
        .await
        .expect("events should be written");

    // Second run, only the new event is processed.
    let checkpoint = event_store
        .read_checkpoint::<ProjectionState>("balance", &id, &token)
        .await
        .expect("checkpoint should be read")
        .expect("checkpoint should exist");

    let events: Vec<_> = event_store
        .read_from_stream(&id, VersionSelect::after(checkpoint.position), &token)
        .try_collect()
        .await
        .expect("stream should be read");

    assert_eq!(1, events.len());
    assert_eq!(3, events[0].version);
    assert_eq!(
        Some(20),
        events[0]
            .payload_as::<setup::MoneyDeposited>()
            .map(|deposit| deposit.amount)
    );
    assert_eq!(Some(ProjectionState { count: 2 }), checkpoint.state);
}
