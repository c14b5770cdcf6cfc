//! Property-Based Tests for the domain rules
//!
//! - Bootstrap state derivation covers every raw value
//! - The vendor-extension rule accepts exactly `x-<seg>-<seg>[-<seg>...]`
//! - The online/offline partition is total and disjoint
//! - `ERRORED` is produced iff the broker said `SUCCESS` without `status: true`

use proptest::prelude::*;
use rstuf_core::{
    bootstrap::{pre_lock_value, signing_value},
    is_vendor_extension, offline_roles, online_roles, BootstrapPhase, BootstrapState, Role,
    TaskOutcome, TaskState, TaskView,
};
use serde_json::json;

// =============================================================================
// Bootstrap state
// =============================================================================

proptest! {
    #[test]
    fn prop_pre_lock_is_locked_not_bootstrapped(id in "[0-9a-f]{32}") {
        let state = BootstrapState::from_setting(Some(&pre_lock_value(&id)));
        prop_assert!(!state.bootstrap);
        prop_assert_eq!(state.state, Some(BootstrapPhase::Pre));
        prop_assert_eq!(state.task_id, Some(id));
    }

    #[test]
    fn prop_signing_is_locked_not_bootstrapped(id in "[0-9a-f]{32}") {
        let state = BootstrapState::from_setting(Some(&signing_value(&id)));
        prop_assert!(state.is_locked());
        prop_assert!(!state.is_finished());
        prop_assert_eq!(state.state, Some(BootstrapPhase::Signing));
    }

    #[test]
    fn prop_bare_id_is_finished(id in "[0-9a-f]{32}") {
        let state = BootstrapState::from_setting(Some(&id));
        prop_assert!(state.is_finished());
        prop_assert_eq!(state.task_id, Some(id));
    }

    /// Every non-empty value is exactly one of pre, signing or finished
    #[test]
    fn prop_every_value_has_one_phase(raw in ".{1,64}") {
        let state = BootstrapState::from_setting(Some(&raw));
        prop_assert!(state.state.is_some());
        prop_assert_eq!(state.bootstrap, state.state == Some(BootstrapPhase::Finished));
    }
}

// =============================================================================
// Vendor extensions
// =============================================================================

proptest! {
    #[test]
    fn prop_well_formed_extensions_accepted(
        vendor in "[a-z0-9]{1,10}",
        names in prop::collection::vec("[a-z0-9_]{1,10}", 1..4),
    ) {
        let name = format!("x-{}-{}", vendor, names.join("-"));
        prop_assert!(is_vendor_extension(&name), "{} should be accepted", name);
    }

    #[test]
    fn prop_names_without_x_prefix_rejected(name in "[a-wyz][a-z-]{0,20}") {
        prop_assert!(!is_vendor_extension(&name));
    }

    #[test]
    fn prop_two_segments_rejected(segment in "[a-z]{1,10}") {
        let name = format!("x-{}", segment);
        prop_assert!(!is_vendor_extension(&name));
    }
}

// =============================================================================
// Role partition
// =============================================================================

proptest! {
    #[test]
    fn prop_role_partition(targets_online in any::<bool>()) {
        let online = online_roles(targets_online);
        let offline = offline_roles(targets_online);

        prop_assert!(online.is_disjoint(&offline));
        prop_assert_eq!(online.len() + offline.len(), Role::ALL.len());
        prop_assert!(offline.contains(&Role::Root));
        prop_assert_eq!(online.contains(&Role::Targets), targets_online);
    }
}

// =============================================================================
// Task normalization
// =============================================================================

fn broker_state() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Pending),
        Just(TaskState::Received),
        Just(TaskState::Started),
        Just(TaskState::Running),
        Just(TaskState::Success),
        Just(TaskState::Failure),
        Just(TaskState::Revoked),
        Just(TaskState::Retry),
        Just(TaskState::Rejected),
        Just(TaskState::Ignored),
    ]
}

proptest! {
    #[test]
    fn prop_errored_iff_success_without_status(
        state in broker_state(),
        status in prop::option::of(any::<bool>()),
    ) {
        let outcome = match status {
            Some(status) => json!({"status": status}),
            None => json!({"message": "done"}),
        };
        let view = TaskView::normalize("t", state, Some(TaskOutcome::Value(outcome)));

        let expect_errored = state == TaskState::Success && status != Some(true);
        prop_assert_eq!(view.state == TaskState::Errored, expect_errored);
        if !expect_errored {
            prop_assert_eq!(view.state, state);
        }
    }
}
