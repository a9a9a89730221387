//! Model-checked locking: replay random acquire/release sequences against an
//! in-memory store and a shadow model of who should hold each row.

use fleet_store::model::Installation;
use fleet_store::Store;
use proptest::prelude::*;

const OWNERS: [&str; 2] = ["worker-a", "worker-b"];

#[derive(Debug, Clone)]
enum LockOp {
    Acquire { row: usize, owner: usize },
    Release { row: usize, owner: usize, force: bool },
}

fn lock_op() -> impl Strategy<Value = LockOp> {
    prop_oneof![
        (0..3usize, 0..OWNERS.len()).prop_map(|(row, owner)| LockOp::Acquire { row, owner }),
        (0..3usize, 0..OWNERS.len(), any::<bool>())
            .prop_map(|(row, owner, force)| LockOp::Release { row, owner, force }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_lock_state_matches_shadow_model(ops in proptest::collection::vec(lock_op(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let store = Store::open_in_memory().await.unwrap();

            let mut ids = Vec::new();
            for _ in 0..3 {
                let mut installation = Installation::new("owner-1", "1.0.0");
                store.create_installation(&mut installation).await.unwrap();
                ids.push(installation.id);
            }

            // Expected holder per row.
            let mut holders: Vec<Option<&str>> = vec![None; ids.len()];

            for op in ops {
                match op {
                    LockOp::Acquire { row, owner } => {
                        let owner = OWNERS[owner];
                        let acquired =
                            store.lock_installation(&ids[row], owner).await.unwrap();
                        assert_eq!(acquired, holders[row].is_none());
                        if acquired {
                            holders[row] = Some(owner);
                        }
                    }
                    LockOp::Release { row, owner, force } => {
                        let owner = OWNERS[owner];
                        let released = store
                            .unlock_installation(&ids[row], owner, force)
                            .await
                            .unwrap();
                        let expected = match holders[row] {
                            Some(holder) => force || holder == owner,
                            None => false,
                        };
                        assert_eq!(released, expected);
                        if released {
                            holders[row] = None;
                        }
                    }
                }

                // The two lock columns always move together.
                for (id, holder) in ids.iter().zip(&holders) {
                    let stored = store.get_installation(id).await.unwrap().unwrap();
                    assert_eq!(stored.lock_acquired_by.as_deref(), *holder);
                    assert_eq!(stored.lock_acquired_at != 0, holder.is_some());
                }
            }
        });
    }
}
