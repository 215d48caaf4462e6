mod util;

use std::sync::{Arc, Once};
use std::time::Duration;

use updash_engine::{
    ApiRequest, DispatchError, Dispatcher, DispatcherSettings, PerformError,
};
use util::{ok_response, response, wait_until, GatedPerformer, ManualClock, ScriptedPerformer};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(dash_logging::initialize_for_tests);
}

fn fast_settings() -> DispatcherSettings {
    DispatcherSettings {
        max_workers: 1,
        ..DispatcherSettings::default()
    }
}

fn dispatcher_with(
    settings: DispatcherSettings,
    performer: Arc<dyn updash_engine::HttpPerformer>,
) -> (Dispatcher, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(1_700_000_000));
    let dispatcher = Dispatcher::with_clock(settings, performer, clock.clone());
    (dispatcher, clock)
}

#[test]
fn full_queue_rejects_without_network_contact() {
    init_logging();
    let performer = Arc::new(GatedPerformer::new());
    let settings = DispatcherSettings {
        max_workers: 1,
        max_queue_size: 3,
        ..DispatcherSettings::default()
    };
    let (dispatcher, _clock) = dispatcher_with(settings, performer.clone());

    // First submission is picked up by the single worker and parks inside
    // the gated performer.
    let first = dispatcher.submit(ApiRequest::get("https://api.example.com/items/0"));
    assert!(wait_until(Duration::from_secs(5), || {
        dispatcher.status().in_flight.len() == 1
    }));

    // Fill the queue to capacity behind it.
    let mut queued = Vec::new();
    for index in 1..=3 {
        queued.push(dispatcher.submit(ApiRequest::get(format!(
            "https://api.example.com/items/{index}"
        ))));
    }
    assert_eq!(dispatcher.queue_depth(), 3);

    // Everything past capacity fails fast, before any network contact.
    for index in 4..=8 {
        let promise = dispatcher.submit(ApiRequest::get(format!(
            "https://api.example.com/items/{index}"
        )));
        assert_eq!(
            promise.try_get(),
            Some(Err(DispatchError::QueueFull { capacity: 3 }))
        );
    }
    assert_eq!(performer.call_count(), 1);

    performer.open();
    for promise in queued {
        assert!(promise.wait(Duration::from_secs(5)).expect("settled").is_ok());
    }
    assert!(first.wait(Duration::from_secs(5)).expect("settled").is_ok());
    assert!(!performer
        .calls()
        .iter()
        .any(|url| url.ends_with("/items/4")));
    dispatcher.shutdown();
}

#[test]
fn requests_dispatch_in_submission_order() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(Vec::new()));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer.clone());

    let promises: Vec<_> = (0..3)
        .map(|index| {
            dispatcher.submit(ApiRequest::get(format!("https://api.example.com/{index}")))
        })
        .collect();
    for promise in promises {
        assert!(promise.wait(Duration::from_secs(5)).expect("settled").is_ok());
    }

    assert_eq!(
        performer.calls(),
        vec![
            "https://api.example.com/0",
            "https://api.example.com/1",
            "https://api.example.com/2",
        ]
    );
    dispatcher.shutdown();
}

#[test]
fn quota_429_retries_transparently() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![
        Ok(response(429, &[("retry-after", "3")], "slow down")),
        Ok(ok_response()),
    ]));
    let (dispatcher, clock) = dispatcher_with(fast_settings(), performer.clone());

    let result = dispatcher.execute(ApiRequest::get("https://api.example.com/repos"));
    assert!(result.is_ok());
    assert_eq!(performer.call_count(), 2);
    // retry-after plus one second of slack.
    assert!(clock.slept_for(Duration::from_secs(4)));
    dispatcher.shutdown();
}

#[test]
fn quota_429_without_hints_uses_the_fallback_delay() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![
        Ok(response(429, &[], "slow down")),
        Ok(ok_response()),
    ]));
    let (dispatcher, clock) = dispatcher_with(fast_settings(), performer.clone());

    let result = dispatcher.execute(ApiRequest::get("https://api.example.com/repos"));
    assert!(result.is_ok());
    assert!(clock.slept_for(Duration::from_secs(60)));
    dispatcher.shutdown();
}

#[test]
fn disguised_rate_limit_403_is_retried() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![
        Ok(response(403, &[], "You have triggered an abuse detection mechanism")),
        Ok(ok_response()),
    ]));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer.clone());

    let result = dispatcher.execute(ApiRequest::get("https://api.example.com/repos"));
    assert!(result.is_ok());
    assert_eq!(performer.call_count(), 2);
    dispatcher.shutdown();
}

#[test]
fn genuine_403_rejects_immediately() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![Ok(response(
        403,
        &[],
        "Bad credentials",
    ))]));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer.clone());

    let err = dispatcher
        .execute(ApiRequest::get("https://api.example.com/repos"))
        .expect_err("forbidden");
    assert!(matches!(err, DispatchError::Forbidden { .. }));
    assert_eq!(performer.call_count(), 1);
    dispatcher.shutdown();
}

#[test]
fn other_http_statuses_surface_directly() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![Ok(response(
        500,
        &[],
        "server error",
    ))]));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer);

    let err = dispatcher
        .execute(ApiRequest::get("https://api.example.com/repos"))
        .expect_err("http error");
    assert_eq!(
        err,
        DispatchError::HttpStatus {
            status: 500,
            operation: "GET https://api.example.com/repos".to_string(),
        }
    );
    dispatcher.shutdown();
}

#[test]
fn transport_errors_surface_directly() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![Err(PerformError::Network(
        "connection refused".to_string(),
    ))]));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer);

    let err = dispatcher
        .execute(ApiRequest::get("https://api.example.com/repos"))
        .expect_err("transport error");
    assert!(matches!(err, DispatchError::Transport { .. }));
    dispatcher.shutdown();
}

#[test]
fn exhausted_general_window_delays_the_next_dispatch() {
    init_logging();
    // First response empties the general window with a reset 5s out; the
    // second request must be held until past the reset.
    let performer = Arc::new(ScriptedPerformer::new(vec![
        Ok(response(
            200,
            &[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000005"),
            ],
            "{}",
        )),
        Ok(ok_response()),
    ]));
    let (dispatcher, clock) = dispatcher_with(fast_settings(), performer.clone());

    dispatcher
        .execute(ApiRequest::get("https://api.example.com/a"))
        .expect("first request");
    dispatcher
        .execute(ApiRequest::get("https://api.example.com/b"))
        .expect("second request");

    // The hold is reset_at - now + 1 at the moment the worker re-checked.
    assert!(
        clock
            .sleeps()
            .iter()
            .any(|sleep| *sleep >= Duration::from_secs(4) && *sleep <= Duration::from_secs(6)),
        "expected a quota hold, got {:?}",
        clock.sleeps()
    );
    assert_eq!(performer.call_count(), 2);
    dispatcher.shutdown();
}

#[test]
fn retry_ceiling_rejects_when_configured() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![
        Ok(response(429, &[("retry-after", "1")], "slow down")),
        Ok(response(429, &[("retry-after", "1")], "slow down")),
        Ok(response(429, &[("retry-after", "1")], "slow down")),
    ]));
    let settings = DispatcherSettings {
        max_workers: 1,
        max_retries: Some(2),
        ..DispatcherSettings::default()
    };
    let (dispatcher, _clock) = dispatcher_with(settings, performer.clone());

    let err = dispatcher
        .execute(ApiRequest::get("https://api.example.com/repos"))
        .expect_err("retries exhausted");
    assert!(matches!(err, DispatchError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(performer.call_count(), 3);
    dispatcher.shutdown();
}

#[test]
fn execute_times_out_but_leaves_the_request_running() {
    init_logging();
    let performer = Arc::new(GatedPerformer::new());
    let settings = DispatcherSettings {
        max_workers: 1,
        wait_timeout: Duration::from_millis(50),
        ..DispatcherSettings::default()
    };
    let (dispatcher, _clock) = dispatcher_with(settings, performer.clone());

    let err = dispatcher
        .execute(ApiRequest::get("https://api.example.com/slow"))
        .expect_err("timed out");
    match err {
        DispatchError::Timeout {
            operation,
            queue_depth,
            ..
        } => {
            assert_eq!(operation, "GET https://api.example.com/slow");
            assert_eq!(queue_depth, 0);
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // The orphaned request is still in flight and completes once unblocked.
    performer.open();
    assert!(wait_until(Duration::from_secs(5), || {
        dispatcher.status().in_flight.is_empty()
    }));
    assert_eq!(performer.call_count(), 1);
    dispatcher.shutdown();
}

#[test]
fn status_snapshot_reflects_activity() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(vec![Ok(response(
        200,
        &[
            ("x-ratelimit-remaining", "41"),
            ("x-ratelimit-reset", "1700000100"),
            ("x-ratelimit-limit", "5000"),
        ],
        "{}",
    ))]));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer);

    let before = dispatcher.status();
    assert_eq!(before.queue_depth, 0);
    assert!(!before.running);
    assert_eq!(before.workers, 0);

    dispatcher
        .execute(ApiRequest::get("https://api.example.com/x"))
        .expect("request");

    let after = dispatcher.status();
    assert!(after.running);
    assert_eq!(after.workers, 1);
    assert_eq!(after.general.remaining, Some(41));
    assert!(after
        .last_completed
        .as_deref()
        .is_some_and(|entry| entry.contains("GET https://api.example.com/x")));

    let json = serde_json::to_value(&after).expect("serializable status");
    assert_eq!(json["general"]["remaining"], 41);
    dispatcher.shutdown();
}

#[test]
fn search_requests_record_their_spacing() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(Vec::new()));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer);

    dispatcher
        .execute(ApiRequest::get("https://api.example.com/search/issues?q=x"))
        .expect("search request");

    let status = dispatcher.status();
    assert!(status.next_search_available_secs.is_some());
    dispatcher.shutdown();
}

#[test]
fn shutdown_drains_and_joins() {
    init_logging();
    let performer = Arc::new(ScriptedPerformer::new(Vec::new()));
    let (dispatcher, _clock) = dispatcher_with(fast_settings(), performer.clone());

    let promises: Vec<_> = (0..3)
        .map(|index| {
            dispatcher.submit(ApiRequest::get(format!("https://api.example.com/{index}")))
        })
        .collect();
    dispatcher.shutdown();

    // Every accepted request was processed before the workers exited.
    assert_eq!(performer.call_count(), 3);
    for promise in promises {
        assert!(promise.try_get().expect("settled").is_ok());
    }
    assert!(!dispatcher.status().running);
}
