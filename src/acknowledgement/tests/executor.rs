//! Tests for commit ordering and the immediate processor

#[cfg(test)]
mod tests {
    use super::super::utils::{grouped_message, message, RecordingCallback, RecordingClient};
    use crate::acknowledgement::{
        AcknowledgementError, AcknowledgementExecutor, AcknowledgementOrdering,
        AcknowledgementProcessor, ImmediateAcknowledgementProcessor,
    };
    use crate::core::retry::RetryPolicy;
    use crate::queue::{group_id_grouping, QueueClient};
    use futures::future::join_all;
    use std::sync::Arc;
    use std::time::Duration;

    fn executor(
        client: &Arc<RecordingClient>,
        ordering: AcknowledgementOrdering,
    ) -> AcknowledgementExecutor {
        let client: Arc<dyn QueueClient> = client.clone();
        AcknowledgementExecutor::new(client, ordering, Some(group_id_grouping()))
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry())
    }

    /// Earlier messages take longer to commit
    fn slow_first(client: &RecordingClient, count: usize) {
        for i in 0..count {
            client.delay_commit(
                &format!("r{}", i),
                Duration::from_millis(((count - i) * 15) as u64),
            );
        }
    }

    #[tokio::test]
    async fn test_ordered_by_group_requires_grouping_function() {
        let client: Arc<dyn QueueClient> = RecordingClient::new();
        let result =
            AcknowledgementExecutor::new(client, AcknowledgementOrdering::OrderedByGroup, None);

        assert!(matches!(
            result,
            Err(AcknowledgementError::MissingGroupingFunction)
        ));
    }

    #[tokio::test]
    async fn test_ordered_commits_follow_arrival_order() {
        let client = RecordingClient::new();
        slow_first(&client, 4);
        let processor = ImmediateAcknowledgementProcessor::new(executor(
            &client,
            AcknowledgementOrdering::Ordered,
        ));

        join_all((0..4).map(|i| processor.on_acknowledge(vec![message(i)]))).await;

        assert_eq!(client.committed(), vec!["r0", "r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn test_parallel_commits_do_not_wait_for_each_other() {
        let client = RecordingClient::new();
        slow_first(&client, 4);
        let processor = ImmediateAcknowledgementProcessor::new(executor(
            &client,
            AcknowledgementOrdering::Parallel,
        ));

        join_all((0..4).map(|i| processor.on_acknowledge(vec![message(i)]))).await;

        assert_eq!(client.committed(), vec!["r3", "r2", "r1", "r0"]);
    }

    #[tokio::test]
    async fn test_ordered_by_group_orders_within_group_only() {
        let client = RecordingClient::new();
        client.delay_commit("r0", Duration::from_millis(60));
        client.delay_commit("r1", Duration::from_millis(10));
        let processor = ImmediateAcknowledgementProcessor::new(executor(
            &client,
            AcknowledgementOrdering::OrderedByGroup,
        ));

        join_all([
            processor.on_acknowledge(vec![grouped_message(0, "a")]),
            processor.on_acknowledge(vec![grouped_message(1, "a")]),
            processor.on_acknowledge(vec![grouped_message(2, "b")]),
        ])
        .await;

        let committed = client.committed();
        let position = |h: &str| committed.iter().position(|c| c == h).unwrap();
        assert!(position("r0") < position("r1"));
        // Group b is not held up by group a
        assert_eq!(committed[0], "r2");
    }

    #[tokio::test]
    async fn test_schedule_partitions_by_group() {
        let client = RecordingClient::new();
        let executor = executor(&client, AcknowledgementOrdering::OrderedByGroup);

        let units = executor.schedule(vec![
            grouped_message(0, "a"),
            grouped_message(1, "b"),
            grouped_message(2, "a"),
        ]);

        let sizes: Vec<_> = units.iter().map(|u| u.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert!(executor.schedule(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_commits_are_chunked() {
        let client = RecordingClient::new();
        let callback = Arc::new(RecordingCallback::default());
        let executor = executor(&client, AcknowledgementOrdering::Parallel)
            .with_max_acknowledgements_per_batch(10)
            .with_callback(callback.clone());

        executor.acknowledge((0..25).map(message).collect()).await;

        let chunk_sizes: Vec<_> = callback
            .successes
            .lock()
            .unwrap()
            .iter()
            .map(|chunk| chunk.len())
            .collect();
        assert_eq!(chunk_sizes, vec![10, 10, 5]);
        assert_eq!(client.committed().len(), 25);
    }

    #[tokio::test]
    async fn test_failure_reported_and_ordered_sequence_continues() {
        let client = RecordingClient::new();
        client.fail_commit("r1");
        let callback = Arc::new(RecordingCallback::default());
        let processor = ImmediateAcknowledgementProcessor::new(
            executor(&client, AcknowledgementOrdering::Ordered).with_callback(callback.clone()),
        );

        join_all((0..3).map(|i| processor.on_acknowledge(vec![message(i)]))).await;

        assert_eq!(client.committed(), vec!["r0", "r2"]);
        assert_eq!(*callback.failures.lock().unwrap(), vec![vec!["m1".to_string()]]);
        assert_eq!(callback.successes.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_commit_is_retried() {
        let client = RecordingClient::new();
        client.fail_commit("r0");
        let executor = executor(&client, AcknowledgementOrdering::Parallel).with_retry_policy(
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
        );

        executor.acknowledge(vec![message(0)]).await;

        assert_eq!(client.attempts(), 3);
        assert!(client.committed().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_processor_lifecycle_is_trivial() {
        let client = RecordingClient::new();
        let processor = ImmediateAcknowledgementProcessor::new(executor(
            &client,
            AcknowledgementOrdering::Parallel,
        ));

        processor.start();
        processor.on_acknowledge(vec![message(0)]).await;
        assert!(processor.stop().await);
        assert_eq!(processor.ordering(), AcknowledgementOrdering::Parallel);
        assert_eq!(client.committed(), vec!["r0"]);
    }
}
