//! Reconcilers for the Composition Operator CRDs
//!
//! This module contains the business logic for each resource kind:
//! - diffing a composition's desired component set against its children
//! - advancing a component through its provisioning pipeline
//! - aggregating child statuses into the composition status

pub mod component;
pub mod composition;
