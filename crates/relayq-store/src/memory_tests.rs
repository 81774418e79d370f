    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_push_and_pop_transfer_is_fifo() {
        let store = MemoryStore::new();
        store.push("todo", "a").await.unwrap();
        store.push("todo", "b").await.unwrap();

        assert_eq!(store.pop_transfer("todo", "doing").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.range("doing").await.unwrap(), vec!["a"]);
        assert_eq!(store.range("todo").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_pop_transfer_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.pop_transfer("todo", "doing").await.unwrap(), None);
        assert_eq!(store.len("doing").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bpop_transfer_times_out() {
        let store = MemoryStore::new();
        let result = store
            .bpop_transfer("todo", "doing", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_bpop_transfer_wakes_on_push() {
        let store = MemoryStore::new();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store.bpop_transfer("todo", "doing", Duration::ZERO).await.unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push("todo", "late").await.unwrap();

        let claimed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed, Some("late".to_string()));
        assert_eq!(store.range("doing").await.unwrap(), vec!["late"]);
    }

    #[tokio::test]
    async fn test_pull_and_move_item() {
        let store = MemoryStore::new();
        for item in ["a", "b", "c"] {
            store.push("doing", item).await.unwrap();
        }

        assert_eq!(store.move_item("doing", "done", "b").await.unwrap(), 1);
        assert_eq!(store.move_item("doing", "done", "b").await.unwrap(), 0);
        assert_eq!(store.pull("doing", "c").await.unwrap(), 1);
        assert_eq!(store.pull("doing", "missing").await.unwrap(), 0);

        assert_eq!(store.range("doing").await.unwrap(), vec!["a"]);
        assert_eq!(store.range("done").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_drain_due_orders_by_score_then_member() {
        let store = MemoryStore::new();
        store.zadd("deferred", "late", 300).await.unwrap();
        store.zadd("deferred", "b", 100).await.unwrap();
        store.zadd("deferred", "a", 100).await.unwrap();
        store.zadd("deferred", "first", 50).await.unwrap();

        let drained = store.drain_due("deferred", 100, "todo").await.unwrap();
        assert_eq!(drained, vec!["first", "a", "b"]);
        assert_eq!(store.range("todo").await.unwrap(), vec!["first", "a", "b"]);
        assert_eq!(store.zcard("deferred").await.unwrap(), 1);
        assert_eq!(store.zscore("deferred", "late").await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn test_zadd_updates_score() {
        let store = MemoryStore::new();
        store.zadd("deferred", "x", 500).await.unwrap();
        store.zadd("deferred", "x", 10).await.unwrap();

        assert_eq!(store.zcard("deferred").await.unwrap(), 1);
        assert_eq!(store.drain_due("deferred", 10, "todo").await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_transfer_member() {
        let store = MemoryStore::new();
        store.zadd("deferred", "x", 1_000).await.unwrap();

        assert_eq!(store.transfer_member("deferred", "x", "todo").await.unwrap(), 1);
        assert_eq!(store.transfer_member("deferred", "x", "todo").await.unwrap(), 0);
        assert_eq!(store.range("todo").await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_promote_recurring_reschedules() {
        let store = MemoryStore::new();
        store.schedule_recurring("recurring", "recurring:intervals", "r", 100, 100).await.unwrap();
        store.zadd("recurring", "orphan", 50).await.unwrap();

        let promoted = store.promote_recurring("recurring", "recurring:intervals", 120, "todo").await.unwrap();
        assert_eq!(promoted, vec!["orphan", "r"]);
        assert_eq!(store.zscore("recurring", "r").await.unwrap(), Some(220));
        assert_eq!(store.zscore("recurring", "orphan").await.unwrap(), None);

        let promoted = store.promote_recurring("recurring", "recurring:intervals", 150, "todo").await.unwrap();
        assert!(promoted.is_empty());
        assert_eq!(store.range("todo").await.unwrap(), vec!["orphan", "r"]);
    }

    #[tokio::test]
    async fn test_unschedule_recurring() {
        let store = MemoryStore::new();
        store.schedule_recurring("recurring", "recurring:intervals", "r", 100, 100).await.unwrap();
        assert_eq!(store.recurring_interval("recurring:intervals", "r").await.unwrap(), Some(100));

        assert_eq!(store.unschedule_recurring("recurring", "recurring:intervals", "r").await.unwrap(), 1);
        assert_eq!(store.recurring_interval("recurring:intervals", "r").await.unwrap(), None);
        assert_eq!(store.unschedule_recurring("recurring", "recurring:intervals", "r").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_promote_recurring_saturates_fire_time() {
        let store = MemoryStore::new();
        store.schedule_recurring("recurring", "recurring|intervals", "r", i64::MAX, 100).await.unwrap();

        let promoted = store.promote_recurring("recurring", "recurring|intervals", 100, "todo").await.unwrap();
        assert_eq!(promoted, vec!["r"]);
        assert_eq!(store.zscore("recurring", "r").await.unwrap(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_intervals_read_from_named_map() {
        let store = MemoryStore::new();
        store.schedule_recurring("recurring", "recurring|intervals", "r", 100, 100).await.unwrap();

        assert_eq!(store.recurring_interval("recurring:intervals", "r").await.unwrap(), None);
        assert_eq!(store.recurring_interval("recurring|intervals", "r").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_key_value_space() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"value").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));

        assert_eq!(store.del("k").await.unwrap(), 1);
        assert_eq!(store.del("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connector_shares_data() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        conn.push("todo", "shared").await.unwrap();
        assert_eq!(store.len("todo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_distinct() {
        let store = MemoryStore::new();
        for i in 0..50 {
            store.push("todo", &format!("t{}", i)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.pop_transfer("todo", "doing").await.unwrap()
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            claimed.push(handle.await.unwrap().unwrap());
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 50);
    }
