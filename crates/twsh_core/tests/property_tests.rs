//! Property checks over the small engine invariants.

use proptest::prelude::*;
use twsh_core::executor::pattern_matches;
use twsh_core::job::{JobState, JobTable};
use twsh_core::{ExecutionContext, ScopeManager};
use twsh_hal::Pid;

proptest! {
    #[test]
    fn last_status_always_lands_in_byte_range(status in i32::MIN..i32::MAX) {
        let mut ctx = ExecutionContext::new(false);
        ctx.set_last_status(status);
        prop_assert!((0..=255).contains(&ctx.last_status));
    }

    #[test]
    fn job_ids_never_collide_among_active(ops in proptest::collection::vec(0u8..3, 1..64)) {
        let mut table = JobTable::new();
        let mut pid = 1000;
        for op in ops {
            match op {
                0 | 1 => {
                    pid += 1;
                    let p = Pid::from_raw(pid);
                    table.create(p, &[p], format!("cmd-{pid}"), JobState::Background);
                }
                _ => {
                    // Remove the lowest-numbered job, if any.
                    if let Some(id) = table.iter().map(|j| j.id).min() {
                        table.remove(id);
                    }
                }
            }
            let ids: Vec<u32> = table.iter().map(|j| j.id).collect();
            let mut deduped = ids.clone();
            deduped.dedup();
            prop_assert_eq!(&ids, &deduped);
            // Sequential assignment: ids are strictly increasing in table order.
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn scope_stack_balances_and_global_survives(
        names in proptest::collection::vec("[a-z]{1,8}", 1..16)
    ) {
        let mut scopes = ScopeManager::new();
        for name in &names {
            scopes.push_scope(name.clone());
            scopes.set_variable(name, "v", true);
        }
        for _ in &names {
            prop_assert!(scopes.pop_scope().is_ok());
        }
        // Only the global scope remains and refuses to pop.
        prop_assert_eq!(scopes.depth(), 1);
        prop_assert!(scopes.pop_scope().is_err());
    }

    #[test]
    fn literal_patterns_match_themselves(text in "[a-zA-Z0-9_./-]{0,20}") {
        prop_assert!(pattern_matches(&text, &text));
    }

    #[test]
    fn star_matches_any_text(text in "[a-zA-Z0-9 ]{0,20}") {
        prop_assert!(pattern_matches("*", &text));
    }
}
