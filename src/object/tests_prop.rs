// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Property tests for the handle table
//!
//! Random add/remove sequences, checked against a shadow model of live
//! handles after every step.

use super::{Handle, HandleTable, KernelObject, ObjectKind, ObjectRef, Port};
use crate::result::ResultCode;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add,
    /// Remove the live handle at this position (mod live count)
    Remove(usize),
    /// Remove a previously removed handle
    RemoveStale(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Add),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::RemoveStale),
    ]
}

fn port() -> ObjectRef {
    KernelObject::create(ObjectKind::Port(Port::new("p", true).unwrap()))
}

proptest! {
    #[test]
    fn occupancy_tracks_model(capacity in 1usize..32, ops in prop::collection::vec(arb_op(), 0..200)) {
        let table = HandleTable::new(capacity);
        let mut live: Vec<Handle> = Vec::new();
        let mut dead: Vec<Handle> = Vec::new();

        for op in ops {
            match op {
                Op::Add => match table.add(port()) {
                    Ok(handle) => {
                        prop_assert!((handle.index() as usize) < capacity);
                        prop_assert_ne!(handle.linear_id(), 0);
                        prop_assert_eq!(handle.reserved(), 0);
                        prop_assert!(!live.contains(&handle));
                        live.push(handle);
                    }
                    Err(code) => {
                        prop_assert_eq!(code, ResultCode::OUT_OF_HANDLES);
                        prop_assert_eq!(live.len(), capacity);
                    }
                },
                Op::Remove(i) if !live.is_empty() => {
                    let handle = live.swap_remove(i % live.len());
                    prop_assert_eq!(table.remove(handle), Ok(()));
                    dead.push(handle);
                }
                Op::RemoveStale(i) if !dead.is_empty() => {
                    let stale = dead[i % dead.len()];
                    // A reissued identical handle is live again, not stale
                    prop_assume!(!live.contains(&stale));
                    prop_assert_eq!(table.remove(stale), Err(ResultCode::INVALID_HANDLE));
                }
                _ => {}
            }

            prop_assert_eq!(table.count(), live.len());
            prop_assert!(table.count() <= capacity);
        }

        for handle in &live {
            prop_assert!(table.get(*handle).is_some());
        }
    }

    #[test]
    fn stale_handle_leaves_occupant(rounds in 1usize..64) {
        let table = HandleTable::new(1);
        let mut previous = table.add(port()).unwrap();
        for _ in 0..rounds {
            table.remove(previous).unwrap();
            let current = table.add(port()).unwrap();
            prop_assert_eq!(current.index(), previous.index());
            prop_assert_eq!(table.remove(previous), Err(ResultCode::INVALID_HANDLE));
            prop_assert!(table.get(current).is_some());
            previous = current;
        }
        prop_assert_eq!(table.count(), 1);
    }
}
