//! Property-based tests for the segmented buffer.
//!
//! Whatever mix of pushes, pops and advances is applied, the bytes that come
//! out must be a prefix-preserving slice of the bytes that went in, and the
//! cached size must always match what is left.

use proptest::prelude::*;

use mill_pool::SegBuffer;

#[derive(Debug, Clone)]
enum Op {
    Push(Vec<u8>),
    Pop(usize),
    Advance(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Op::Push),
        (0usize..96).prop_map(Op::Pop),
        (0usize..96).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn bytes_leave_in_arrival_order(ops in prop::collection::vec(op(), 0..64)) {
        let mut buf = SegBuffer::new();
        let mut pushed: Vec<u8> = Vec::new();
        let mut consumed = 0usize;

        for op in ops {
            match op {
                Op::Push(data) => {
                    pushed.extend_from_slice(&data);
                    buf.push(data);
                }
                Op::Pop(len) => {
                    let out = buf.pop(len);
                    prop_assert_eq!(out.len(), len.min(pushed.len() - consumed));
                    prop_assert_eq!(&out[..], &pushed[consumed..consumed + out.len()]);
                    consumed += out.len();
                }
                Op::Advance(cnt) => {
                    consumed += cnt.min(pushed.len() - consumed);
                    buf.advance(cnt);
                }
            }
            prop_assert_eq!(buf.size(), pushed.len() - consumed);
            prop_assert_eq!(buf.is_empty(), buf.segments() == 0);
        }

        let rest = buf.size();
        prop_assert_eq!(buf.pop(rest), pushed[consumed..].to_vec());
        prop_assert_eq!(buf.segments(), 0);
    }

    #[test]
    fn chunk_is_front_of_remaining(
        segs in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 1..8),
        skip in 0usize..128,
    ) {
        let mut buf = SegBuffer::new();
        let mut all = Vec::new();
        for seg in segs {
            all.extend_from_slice(&seg);
            buf.push(seg);
        }
        buf.advance(skip);

        let start = skip.min(all.len());
        let chunk = buf.chunk();
        prop_assert!(chunk.len() <= all.len() - start);
        prop_assert_eq!(chunk, &all[start..start + chunk.len()]);
        prop_assert_eq!(chunk.is_empty(), buf.is_empty());
    }
}
