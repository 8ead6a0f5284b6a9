//! 等待者“恰好结算一次”的性质测试。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：对同一个挂起的等待者，任意交错的取消、恢复、无错断开、带错断开与重复暂停
//!   都不能让它被结算两次，且最终结果必须归属于第一个到达的触发源。
//! - **设计手法 (How)**：Proptest 生成事件序列；生产者 Future 以空 `Waker` 手动轮询，取消即丢弃
//!   Future；每个序列结束后对照“首个有效事件”推导出的期望结果。
//! - **断言 (What)**：
//!   1. 等待者的结算结果等于首个有效事件对应的结果；
//!   2. 仍存活的生产者得到与之一致的返回值，带错断开时错误实例保持同一性；
//!   3. 序列结束后等待者槽位一定为空。

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;
use proptest::prelude::*;
use spark_write_gate::{
    DrainError, DrainOutcome, DrainWaiter, Scheduler, Transport, TransportError, WriteGate,
};

struct SilentTransport;

impl Transport for SilentTransport {}

#[derive(Default)]
struct CapturingScheduler {
    last: Mutex<Option<DrainWaiter>>,
}

impl Scheduler for CapturingScheduler {
    fn create_waiter(&self) -> DrainWaiter {
        let waiter = DrainWaiter::new(1);
        *self.last.lock().expect("scheduler lock") = Some(waiter.clone());
        waiter
    }
}

#[derive(Clone, Copy, Debug)]
enum Event {
    Cancel,
    Resume,
    LoseClean,
    LoseError,
    Pause,
}

#[derive(Debug, PartialEq, Eq)]
enum Expected {
    Released,
    Failed,
    Cancelled,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Cancel),
        Just(Event::Resume),
        Just(Event::LoseClean),
        Just(Event::LoseError),
        Just(Event::Pause),
    ]
}

fn classify(outcome: &DrainOutcome) -> Expected {
    match outcome {
        DrainOutcome::Released => Expected::Released,
        DrainOutcome::Failed(_) => Expected::Failed,
        DrainOutcome::Cancelled => Expected::Cancelled,
    }
}

proptest! {
    #[test]
    fn pending_waiter_is_settled_exactly_once(events in prop::collection::vec(event(), 1..10)) {
        let scheduler = Arc::new(CapturingScheduler::default());
        let gate = WriteGate::new(scheduler.clone());
        gate.connection_made(Arc::new(SilentTransport));
        gate.pause_writing();

        let mut cx = Context::from_waker(noop_waker_ref());
        let mut producer: Option<Pin<Box<dyn Future<Output = Result<(), DrainError>> + '_>>> =
            Some(Box::pin(gate.await_drain()));
        let first_poll = producer.as_mut().map(|fut| fut.as_mut().poll(&mut cx));
        prop_assert!(matches!(first_poll, Some(Poll::Pending)));

        let waiter = scheduler
            .last
            .lock()
            .expect("scheduler lock")
            .clone()
            .expect("paused gate must create a waiter");

        let transport_error = TransportError::new(io::Error::other("transport failure"));
        let mut expected = None;
        for event in &events {
            let candidate = match event {
                Event::Cancel => {
                    producer = None;
                    Some(Expected::Cancelled)
                }
                Event::Resume => {
                    gate.resume_writing();
                    Some(Expected::Released)
                }
                Event::LoseClean => {
                    gate.connection_lost(None);
                    Some(Expected::Released)
                }
                Event::LoseError => {
                    gate.connection_lost(Some(transport_error.clone()));
                    Some(Expected::Failed)
                }
                Event::Pause => {
                    gate.pause_writing();
                    None
                }
            };
            if expected.is_none() {
                expected = candidate;
            }
        }

        let expected = match expected {
            Some(expected) => expected,
            None => {
                gate.resume_writing();
                Expected::Released
            }
        };

        let outcome = waiter.outcome().expect("waiter must be settled");
        prop_assert_eq!(classify(&outcome), expected);
        if let DrainOutcome::Failed(seen) = &outcome {
            prop_assert!(seen.same_as(&transport_error));
        }

        if let Some(mut fut) = producer.take() {
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(Ok(())) => prop_assert!(matches!(outcome, DrainOutcome::Released)),
                Poll::Ready(Err(DrainError::ConnectionLost(seen))) => {
                    prop_assert!(seen.same_as(&transport_error));
                }
                Poll::Ready(Err(other)) => prop_assert!(false, "unexpected error: {other:?}"),
                Poll::Pending => prop_assert!(false, "settled waiter must complete the producer"),
            }
        }

        prop_assert!(!gate.has_pending_drain());
    }
}
