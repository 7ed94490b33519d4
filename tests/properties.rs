//! Property tests of the delivery protocol of a single subscriber, driven
//! through the broker the way client requests drive it.

use crossbeam_channel::Receiver;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use synchub::{
    decode_event, ChannelTarget, ClientId, DispatchMode, EventBroker, EventEncoding, EventSeq,
    EventTarget, SyncRequest, SyncTask,
};

#[derive(Clone, Debug)]
enum Op {
    Enqueue,
    Drain,
    /// Ack relative to the highest sequence delivered so far.
    Ack { behind: u64 },
    Disconnect,
    Reconnect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Enqueue),
        3 => Just(Op::Drain),
        2 => (0u64..4).prop_map(|behind| Op::Ack { behind }),
        1 => Just(Op::Disconnect),
        1 => Just(Op::Reconnect),
    ]
}

fn drained(receiver: &Receiver<Vec<u8>>) -> Vec<u64> {
    receiver
        .try_iter()
        .map(|bytes| decode_event(&bytes, EventEncoding::Json).unwrap().seq.0)
        .collect()
}

proptest! {
    #[test]
    fn prop_delivery_protocol(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (target, receiver) = ChannelTarget::new(EventEncoding::Json);
        let dyn_target: Arc<dyn EventTarget> = target.clone();
        let broker = EventBroker::new(DispatchMode::Synchronous);
        let a = ClientId::new("a");
        broker.subscribe_message("m", &a, &dyn_target, false).unwrap();
        let publish = SyncRequest::new(vec![SyncTask::Message {
            name: "m".to_string(),
            param: Value::Null,
        }])
        .with_client("b");
        let ack = |seq: u64| {
            broker.enqueue_sync_tasks(
                &SyncRequest::new(vec![]).with_client("a").with_ack(EventSeq(seq)),
                None,
            );
        };

        let mut enqueued = BTreeSet::new();
        // delivered since the last ack, i.e. in the sent list
        let mut in_flight = BTreeSet::new();
        let mut retired = BTreeSet::new();
        let mut highest_delivered = 0u64;

        for op in ops {
            match op {
                Op::Enqueue => {
                    prop_assert_eq!(broker.enqueue_sync_tasks(&publish, None), 1);
                    let seq = broker.subscriber_info(&a).unwrap().last_seq.0;
                    prop_assert!(enqueued.iter().all(|&s| s < seq));
                    enqueued.insert(seq);
                }
                Op::Drain => {
                    broker.send_queued_events();
                    let seqs = drained(&receiver);
                    // ordered within a drain
                    prop_assert!(seqs.windows(2).all(|w| w[0] < w[1]));
                    for seq in seqs {
                        // never delivered again once acknowledged
                        prop_assert!(!retired.contains(&seq));
                        in_flight.insert(seq);
                        highest_delivered = highest_delivered.max(seq);
                    }
                }
                Op::Ack { behind } => {
                    let ack_seq = highest_delivered.saturating_sub(behind);
                    ack(ack_seq);
                    retired.extend(in_flight.iter().copied().filter(|&s| s <= ack_seq));
                    in_flight.clear();
                }
                Op::Disconnect => target.close(),
                Op::Reconnect => target.reopen(),
            }
        }

        // everything not acknowledged is still retrievable
        target.reopen();
        ack(0);
        broker.send_queued_events();
        let remaining: BTreeSet<u64> = drained(&receiver).into_iter().collect();
        let expected: BTreeSet<u64> = enqueued.difference(&retired).copied().collect();
        prop_assert_eq!(remaining, expected);
    }
}
