use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use neon_sim::ipc::RingBuffer;
use proptest::prelude::*;
use rand::Rng;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
    Single(u8),
    Take,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..40).prop_map(Op::Write),
        (0usize..40).prop_map(Op::Read),
        any::<u8>().prop_map(Op::Single),
        Just(Op::Take),
    ]
}

proptest! {
    /// 与 VecDeque 模型对照：读出顺序与写入顺序一致，容量为 N - 1
    #[test]
    fn fifo_matches_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let rb: RingBuffer<u8, 32> = RingBuffer::new();
        let mut model: VecDeque<u8> = VecDeque::new();
        let capacity = rb.capacity();

        for op in ops {
            match op {
                Op::Write(data) => {
                    let expected = data.len().min(capacity - model.len());
                    prop_assert_eq!(rb.write_slice(&data), expected);
                    model.extend(&data[..expected]);
                }
                Op::Read(len) => {
                    let mut out = vec![0u8; len];
                    let read = rb.read_slice(&mut out);
                    let expected: Vec<u8> = model.drain(..len.min(model.len())).collect();
                    prop_assert_eq!(&out[..read], expected.as_slice());
                }
                Op::Single(byte) => {
                    let accepted = rb.write(byte);
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(byte);
                    }
                }
                Op::Take => {
                    prop_assert_eq!(rb.peek(), model.front().copied());
                    prop_assert_eq!(rb.read(), model.pop_front());
                }
            }
            prop_assert_eq!(rb.available(), model.len());
            prop_assert_eq!(rb.available() + rb.free(), capacity);
        }
    }
}

#[test]
fn test_saturation_rejects_without_overwrite() {
    let rb: RingBuffer<u8, 32768> = RingBuffer::new();
    let accepted = (0..40_000u32).filter(|i| rb.write(*i as u8)).count();
    assert_eq!(accepted, 32767);
    assert_eq!(rb.free(), 0);
    assert!(rb.is_full());

    assert!(!rb.write(0xEE));
    assert_eq!(rb.available(), 32767);
    assert_eq!(rb.peek(), Some(0));
}

#[test]
fn test_spsc_preserves_order() {
    const TOTAL: usize = 200_000;
    let rb: Arc<RingBuffer<u8, 1024>> = Arc::new(RingBuffer::new());

    let producer = {
        let rb = rb.clone();
        thread::spawn(move || {
            let mut rng = rand::rng();
            let data: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            let mut sent = 0;
            while sent < TOTAL {
                let chunk = rng.random_range(1..=64).min(TOTAL - sent);
                sent += rb.write_slice(&data[sent..sent + chunk]);
                thread::yield_now();
            }
        })
    };

    let mut rng = rand::rng();
    let mut received = 0;
    let mut out = [0u8; 128];
    while received < TOTAL {
        let want = rng.random_range(1..=out.len());
        let read = rb.read_slice(&mut out[..want]);
        for byte in &out[..read] {
            assert_eq!(*byte, (received % 251) as u8);
            received += 1;
        }
        if read == 0 {
            thread::yield_now();
        }
    }

    producer.join().unwrap();
    assert!(rb.is_empty());
}

#[test]
fn test_drain_between_sizes() {
    let small: RingBuffer<u8, 64> = RingBuffer::new();
    let large: RingBuffer<u8, 4096> = RingBuffer::new();
    let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
    assert_eq!(large.write_slice(&data), 1000);

    let mut collected = Vec::new();
    while !large.is_empty() {
        assert!(large.drain_into(&small) <= 63);
        let mut out = [0u8; 64];
        let read = small.read_slice(&mut out);
        collected.extend_from_slice(&out[..read]);
    }
    assert_eq!(collected, data);
}
