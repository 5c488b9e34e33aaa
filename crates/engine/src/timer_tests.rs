// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timers_fire_once_in_order_of_check() {
    let mut wheel = TimerWheel::new();
    let now = Instant::now();
    wheel.set("a", Wakeup::HeartbeatSweep, Duration::from_secs(5), now);
    wheel.set("b", Wakeup::BusSweep, Duration::from_secs(10), now);

    assert!(wheel.fired(now).is_empty());

    let fired = wheel.fired(now + Duration::from_secs(6));
    assert_eq!(fired, vec![Wakeup::HeartbeatSweep]);

    // Already consumed
    assert!(wheel.fired(now + Duration::from_secs(7)).is_empty());

    let fired = wheel.fired(now + Duration::from_secs(11));
    assert_eq!(fired, vec![Wakeup::BusSweep]);
    assert!(wheel.is_empty());
}

#[test]
fn reset_replaces_deadline() {
    let mut wheel = TimerWheel::new();
    let now = Instant::now();
    wheel.set("tick", Wakeup::TelemetryTick, Duration::from_secs(1), now);
    wheel.set("tick", Wakeup::TelemetryTick, Duration::from_secs(30), now);

    assert!(wheel.fired(now + Duration::from_secs(2)).is_empty());
    assert_eq!(wheel.next_deadline(), Some(now + Duration::from_secs(30)));
}

#[test]
fn cancel_by_key_and_prefix() {
    let mut wheel = TimerWheel::new();
    let now = Instant::now();
    let job = JobId::from_string("job-1");
    let t1 = TaskId::from_string("tsk-1");
    let t2 = TaskId::from_string("tsk-2");
    wheel.set(requeue_key(&t1), Wakeup::RequeueTask { job_id: job, task_id: t1 }, Duration::from_secs(5), now);
    wheel.set(requeue_key(&t2), Wakeup::RequeueTask { job_id: job, task_id: t2 }, Duration::from_secs(5), now);
    wheel.set("sweep", Wakeup::HeartbeatSweep, Duration::from_secs(5), now);

    wheel.cancel(&requeue_key(&t1));
    wheel.cancel_with_prefix("requeue:");

    let fired = wheel.fired(now + Duration::from_secs(6));
    assert_eq!(fired, vec![Wakeup::HeartbeatSweep]);
}

#[test]
fn next_deadline_is_minimum() {
    let mut wheel = TimerWheel::new();
    let now = Instant::now();
    assert!(wheel.next_deadline().is_none());

    wheel.set("late", Wakeup::Checkpoint, Duration::from_secs(60), now);
    wheel.set("soon", Wakeup::BusSweep, Duration::from_secs(1), now);
    assert_eq!(wheel.next_deadline(), Some(now + Duration::from_secs(1)));
}
