//! Integration tests for the reconciliation logic
//!
//! These tests cover the composition diff/aggregation algorithm and the
//! component lifecycle state machine: convergence to the desired child
//! set, orphan removal, status aggregation, idempotent creation, and
//! the terminal behavior of the success phase.

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use composition_operator::crd::{
    child_name, phase, Component, ComponentRef, ComponentSpec, ComponentStatus, Composition,
    CompositionSpec, STATUS_RECONCILING, STATUS_SUCCESS,
};
use composition_operator::reconcilers::component::next_transition;
use composition_operator::reconcilers::composition::{aggregate_status, build_component, plan};

// ============================================================================
// Test Helpers
// ============================================================================

fn composition(name: &str, components: &[&str]) -> Composition {
    Composition {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            uid: Some("2b1f9e6a-0000-0000-0000-000000000000".to_string()),
            ..Default::default()
        },
        spec: CompositionSpec {
            components: components
                .iter()
                .map(|name| ComponentRef {
                    name: name.to_string(),
                })
                .collect(),
        },
        status: None,
    }
}

fn child(parent: &str, component: &str, status: Option<&str>) -> Component {
    Component {
        metadata: ObjectMeta {
            name: Some(child_name(parent, component)),
            namespace: Some("ns".to_string()),
            ..Default::default()
        },
        spec: ComponentSpec {
            component_name: component.to_string(),
        },
        status: status.map(|status| ComponentStatus {
            status: Some(status.to_string()),
            last_transition_time: None,
        }),
    }
}

// ============================================================================
// Plan: convergence and orphan removal
// ============================================================================

#[test]
fn plan_creates_every_component_for_a_fresh_composition() {
    let parent = composition("p", &["a", "b", "c"]);
    let result = plan(&parent.spec.components, &[]);

    assert_eq!(result.to_create, vec!["a", "b", "c"]);
    assert_eq!(result.waiting_for, vec!["a", "b", "c"]);
    assert!(result.orphans.is_empty());
}

#[test]
fn plan_converges_to_exactly_the_desired_child_set() {
    let parent = composition("p", &["a", "b"]);
    let children = vec![
        child("p", "a", Some(phase::SUCCESS)),
        child("p", "b", Some(phase::SUCCESS)),
    ];
    let result = plan(&parent.spec.components, &children);

    assert!(result.to_create.is_empty());
    assert!(result.waiting_for.is_empty());
    assert!(result.orphans.is_empty());
}

#[test]
fn plan_deletes_orphans_without_touching_other_children() {
    let parent = composition("p", &["a"]);
    let children = vec![
        child("p", "a", Some(phase::SUCCESS)),
        child("p", "b", Some(phase::PENDING)),
    ];
    let result = plan(&parent.spec.components, &children);

    assert!(result.to_create.is_empty());
    assert!(result.waiting_for.is_empty());
    assert_eq!(result.orphans, vec!["p-b"]);
}

#[test]
fn plan_handles_a_rename_with_creation_and_deletion_in_one_pass() {
    let parent = composition("p", &["replacement"]);
    let children = vec![child("p", "old", Some(phase::SUCCESS))];
    let result = plan(&parent.spec.components, &children);

    // the replacement is created in the same pass that deletes the old
    // child; the creation pass runs first
    assert_eq!(result.to_create, vec!["replacement"]);
    assert_eq!(result.orphans, vec!["p-old"]);
}

#[test]
fn plan_is_idempotent_when_children_already_exist() {
    let parent = composition("p", &["a", "b"]);
    let children = vec![
        child("p", "a", Some(phase::PENDING)),
        child("p", "b", Some(phase::STARTED)),
    ];
    let result = plan(&parent.spec.components, &children);

    // a second pass in rapid succession degrades to no creations
    assert!(result.to_create.is_empty());
    assert_eq!(result.waiting_for, vec!["a", "b"]);
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn waiting_set_combines_new_and_in_progress_components_in_spec_order() {
    let parent = composition("p", &["b", "a", "c"]);
    let children = vec![
        child("p", "a", Some(phase::RETRYING)),
        child("p", "c", Some(phase::SUCCESS)),
    ];
    let result = plan(&parent.spec.components, &children);

    // "b" is newly created, "a" is pre-existing but not yet successful
    assert_eq!(result.to_create, vec!["b"]);
    assert_eq!(result.waiting_for, vec!["b", "a"]);
}

#[test]
fn aggregate_is_success_only_when_nothing_is_waiting() {
    assert_eq!(aggregate_status(&[]), STATUS_SUCCESS);
    assert_eq!(aggregate_status(&["a".to_string()]), STATUS_RECONCILING);
}

#[test]
fn a_single_unsuccessful_child_keeps_the_composition_reconciling() {
    let parent = composition("p", &["a", "b"]);
    let children = vec![
        child("p", "a", Some(phase::SUCCESS)),
        child("p", "b", Some(phase::FAILING)),
    ];
    let result = plan(&parent.spec.components, &children);

    assert_eq!(result.waiting_for, vec!["b"]);
    assert_eq!(aggregate_status(&result.waiting_for), STATUS_RECONCILING);
}

#[test]
fn children_without_status_are_counted_as_waiting() {
    let parent = composition("p", &["a"]);
    let children = vec![child("p", "a", None)];
    let result = plan(&parent.spec.components, &children);

    assert_eq!(result.waiting_for, vec!["a"]);
}

// ============================================================================
// Child construction
// ============================================================================

#[test]
fn built_components_carry_derived_name_owner_and_component_name() {
    let parent = composition("p", &["a"]);
    let component = build_component(&parent, "a").expect("construction should succeed");

    assert_eq!(component.metadata.name.as_deref(), Some("p-a"));
    assert_eq!(component.metadata.namespace.as_deref(), Some("ns"));
    assert_eq!(component.spec.component_name, "a");
    assert!(component.status.is_none());

    let owner = &component.metadata.owner_references.as_ref().expect("owner reference")[0];
    assert_eq!(owner.kind, "Composition");
    assert_eq!(owner.api_version, "composition.dev/v1alpha1");
    assert_eq!(owner.name, "p");
    assert_eq!(owner.controller, Some(true));
}

#[test]
fn construction_fails_without_a_namespace() {
    let mut parent = composition("p", &["a"]);
    parent.metadata.namespace = None;

    let result = build_component(&parent, "a");
    assert!(result.is_err());
}

#[test]
fn construction_fails_when_the_owner_relation_cannot_be_established() {
    let mut parent = composition("p", &["a"]);
    parent.metadata.uid = None;

    let result = build_component(&parent, "a");
    assert!(result.is_err());
}

#[test]
fn derived_names_are_deterministic() {
    assert_eq!(child_name("p", "a"), "p-a");
    assert_eq!(child_name("backend", "database"), "backend-database");
}

// ============================================================================
// Component state machine
// ============================================================================

#[test]
fn pipeline_advances_through_the_fixed_phase_sequence() {
    let steps = [
        (None, phase::PENDING, Some(Duration::from_secs(5))),
        (Some(phase::PENDING), phase::STARTED, Some(Duration::from_secs(10))),
        (Some(phase::STARTED), phase::FAILING, Some(Duration::from_secs(30))),
        (Some(phase::FAILING), phase::RETRYING, Some(Duration::from_secs(10))),
        (Some(phase::RETRYING), phase::SUCCESS, Some(Duration::from_secs(1))),
    ];

    for (current, next, requeue) in steps {
        let transition = next_transition(current);
        assert_eq!(transition.next, next, "from {:?}", current);
        assert_eq!(transition.requeue, requeue, "from {:?}", current);
    }
}

#[test]
fn unrecognized_phases_are_treated_as_uninitialized() {
    let transition = next_transition(Some("unknown-phase"));
    assert_eq!(transition.next, phase::PENDING);
    assert_eq!(transition.requeue, Some(Duration::from_secs(5)));
}

#[test]
fn success_is_terminal_with_no_further_requeue() {
    let transition = next_transition(Some(phase::SUCCESS));
    assert_eq!(transition.next, phase::SUCCESS);
    assert_eq!(transition.requeue, None);
}

#[test]
fn the_pipeline_reaches_success_in_five_steps_from_unset() {
    let mut current: Option<String> = None;
    let mut steps = 0;
    loop {
        let transition = next_transition(current.as_deref());
        if current.as_deref() == Some(transition.next) {
            break;
        }
        current = Some(transition.next.to_string());
        steps += 1;
        assert!(steps <= 5, "pipeline must terminate");
    }
    assert_eq!(current.as_deref(), Some(phase::SUCCESS));
    assert_eq!(steps, 5);
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn fresh_composition_with_two_components_plans_both_and_reconciles() {
    let parent = composition("p", &["a", "b"]);
    let result = plan(&parent.spec.components, &[]);

    assert_eq!(result.to_create, vec!["a", "b"]);
    assert_eq!(result.waiting_for, vec!["a", "b"]);
    assert_eq!(aggregate_status(&result.waiting_for), STATUS_RECONCILING);

    // the created children are p-a and p-b, and their first reconcile
    // pass initializes them to pending
    for name in &result.to_create {
        let component = build_component(&parent, name).expect("construction should succeed");
        assert_eq!(
            component.metadata.name.as_deref(),
            Some(child_name("p", name).as_str())
        );
        let first = next_transition(None);
        assert_eq!(first.next, phase::PENDING);
    }
}

#[test]
fn deleted_composition_reports_every_remaining_child_for_cleanup() {
    // with the parent gone, nothing in the spec matches: every child is
    // an orphan and no status aggregation applies
    let children = vec![
        child("p", "a", Some(phase::STARTED)),
        child("p", "b", Some(phase::SUCCESS)),
    ];
    let result = plan(&[], &children);

    assert!(result.to_create.is_empty());
    assert!(result.waiting_for.is_empty());
    assert_eq!(result.orphans, vec!["p-a", "p-b"]);
}
