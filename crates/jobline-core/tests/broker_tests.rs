//! Broker behaviour over real TCP connections.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::TestBroker;
use jobline_core::{BrokerConfig, JobCounts};

#[tokio::test]
async fn end_to_end_scenario() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    assert_eq!(client.send("JOB hello world").await, "ID 1");
    assert_eq!(client.send("STATUS 1").await, "waiting");
    assert_eq!(worker.send("FETCH").await, "JOB 1 hello world");
    assert_eq!(client.send("STATUS 1").await, "running");
    assert_eq!(worker.send("DONE 1").await, "OK");
    assert_eq!(client.send("STATUS 1").await, "completed");

    let counts = broker.stop().await;
    assert_eq!(counts, JobCounts { waiting: 0, running: 0, completed: 1 });
}

#[tokio::test]
async fn empty_queue_returns_nojob() {
    let broker = TestBroker::start().await;
    let mut worker = broker.worker().await;
    assert_eq!(worker.send("FETCH").await, "NOJOB");
    assert_eq!(worker.send("FETCH").await, "NOJOB");
}

#[tokio::test]
async fn malformed_input_scenario() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    assert_eq!(client.send("JOB").await, "ERR");
    assert_eq!(client.send("STATUS abc").await, "ERR");
    assert_eq!(worker.send("DONE 999").await, "ERR");
    assert_eq!(worker.send("JOB sneaky").await, "ERR");
    assert_eq!(client.send("FETCH").await, "ERR");

    let counts = broker.stop().await;
    assert_eq!(counts, JobCounts::default());
}

#[tokio::test]
async fn worker_commands_ignore_trailing_tokens() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    assert_eq!(client.send("JOB x").await, "ID 1");
    assert_eq!(worker.send("FETCH now").await, "JOB 1 x");
    assert_eq!(worker.send("DONE 1 extra").await, "OK");
    assert_eq!(client.send("STATUS 1").await, "completed");
    assert_eq!(client.send("STATUS 1 extra").await, "ERR");

    let counts = broker.stop().await;
    assert_eq!(counts, JobCounts { waiting: 0, running: 0, completed: 1 });
}

#[tokio::test]
async fn oversized_integer_ids_are_unknown() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    let huge = format!("1{}", "0".repeat(45));
    assert_eq!(client.send(&format!("STATUS {huge}")).await, "unknown");
    assert_eq!(client.send(&format!("STATUS -{huge}")).await, "unknown");
    assert_eq!(worker.send(&format!("DONE {huge}")).await, "ERR");
}

#[tokio::test]
async fn ids_are_strictly_increasing() {
    let broker = TestBroker::start().await;
    let mut a = broker.client().await;
    let mut b = broker.client().await;

    let mut last = 0u64;
    for i in 0..20 {
        let conn = if i % 2 == 0 { &mut a } else { &mut b };
        let reply = conn.send(&format!("JOB task {i}")).await;
        let id: u64 = reply.strip_prefix("ID ").unwrap().parse().unwrap();
        assert!(id > last, "{id} after {last}");
        last = id;
    }
}

#[tokio::test]
async fn unknown_id_stays_unknown() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    assert_eq!(client.send("STATUS 77").await, "unknown");
    client.send("JOB a").await;
    worker.send("FETCH").await;
    worker.send("DONE 1").await;
    assert_eq!(client.send("STATUS 77").await, "unknown");
    assert_eq!(client.send("STATUS 0").await, "unknown");
}

#[tokio::test]
async fn fetch_is_fifo_across_worker_connections() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut w1 = broker.worker().await;
    let mut w2 = broker.worker().await;

    client.send("JOB first").await;
    client.send("JOB second").await;
    client.send("JOB third").await;

    assert_eq!(w2.send("FETCH").await, "JOB 1 first");
    assert_eq!(w1.send("FETCH").await, "JOB 2 second");
    assert_eq!(w2.send("FETCH").await, "JOB 3 third");
    assert_eq!(w1.send("FETCH").await, "NOJOB");
}

#[tokio::test]
async fn done_is_accepted_once() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;
    let mut other = broker.worker().await;

    client.send("JOB x").await;
    worker.send("FETCH").await;
    assert_eq!(other.send("DONE 1").await, "OK");
    assert_eq!(worker.send("DONE 1").await, "ERR");
    assert_eq!(client.send("STATUS 1").await, "completed");
}

#[tokio::test]
async fn status_is_idempotent() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    client.send("JOB x").await;
    for _ in 0..5 {
        assert_eq!(client.send("STATUS 1").await, "waiting");
    }
}

#[tokio::test]
async fn partial_lines_are_reassembled() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;

    client.write_raw(b"JOB hel").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_raw(b"lo wor").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_raw(b"ld\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("ID 1"));

    let mut worker = broker.worker().await;
    assert_eq!(worker.send("FETCH").await, "JOB 1 hello world");
}

#[tokio::test]
async fn pipelined_lines_get_one_reply_each() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;

    client.write_raw(b"JOB a\nJOB b\r\nSTATUS 2\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("ID 1"));
    assert_eq!(client.read_line().await.as_deref(), Some("ID 2"));
    assert_eq!(client.read_line().await.as_deref(), Some("waiting"));
}

#[tokio::test]
async fn blank_lines_get_no_reply() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;

    client.write_raw(b"\n   \n").await;
    assert_eq!(client.send("STATUS 1").await, "unknown");
}

#[tokio::test]
async fn commands_are_case_insensitive() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    let mut worker = broker.worker().await;

    assert_eq!(client.send("job Mixed Case").await, "ID 1");
    assert_eq!(worker.send("fetch").await, "JOB 1 Mixed Case");
    assert_eq!(worker.send("Done 1").await, "OK");
}

#[tokio::test]
async fn oversized_line_closes_only_that_connection() {
    let config = BrokerConfig {
        max_line_bytes: 32,
        ..BrokerConfig::ephemeral()
    };
    let broker = TestBroker::start_with(config).await;
    let mut noisy = broker.client().await;
    let mut quiet = broker.client().await;

    noisy.write_raw(&[b'x'; 256]).await;
    assert_eq!(noisy.read_line().await, None);

    assert_eq!(quiet.send("JOB still here").await, "ID 1");
}

#[tokio::test]
async fn disconnect_keeps_job_state() {
    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    client.send("JOB x").await;

    {
        let mut worker = broker.worker().await;
        assert_eq!(worker.send("FETCH").await, "JOB 1 x");
    }

    // the worker is gone; its job stays running and is not handed out again
    let mut client2 = broker.client().await;
    assert_eq!(client2.send("STATUS 1").await, "running");
    let mut worker2 = broker.worker().await;
    assert_eq!(worker2.send("FETCH").await, "NOJOB");
}

#[tokio::test]
async fn many_workers_complete_every_job_once() {
    const JOBS: usize = 60;
    const WORKERS: usize = 6;

    let broker = TestBroker::start().await;
    let mut client = broker.client().await;
    for i in 0..JOBS {
        client.send(&format!("JOB job number {i}")).await;
    }

    let mut tasks = Vec::new();
    for _ in 0..WORKERS {
        let mut conn = broker.worker().await;
        tasks.push(tokio::spawn(async move {
            let mut done = Vec::new();
            loop {
                let reply = conn.send("FETCH").await;
                if reply == "NOJOB" {
                    break;
                }
                let id: u64 = reply.split(' ').nth(1).unwrap().parse().unwrap();
                assert_eq!(conn.send(&format!("DONE {id}")).await, "OK");
                done.push(id);
            }
            done
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len(), JOBS);
    assert_eq!(unique.len(), JOBS);

    for id in 1..=JOBS {
        assert_eq!(client.send(&format!("STATUS {id}")).await, "completed");
    }

    let counts = broker.stop().await;
    assert_eq!(counts, JobCounts { waiting: 0, running: 0, completed: JOBS });
}
