//! Reverse index from Component resources to their owning Composition
//!
//! The index answers "which children belong to composition X" without a
//! namespace scan. It is a rebuildable cache fed by a watch stream over
//! Components: create/update events upsert entries, delete events remove
//! them, and a relist rebuilds into a staging state that is swapped in
//! whole so readers never observe a half-built index. The index is only
//! ever used to discover children, never as the authority on their
//! existence; staleness costs extra reconciliation passes, not
//! correctness.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::{watcher, watcher::Event, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::OperatorConfig;
use crate::crd::Component;

/// Extract the owning composition's name from a component's controller
/// owner reference.
///
/// Declared once for the Component kind; relations whose kind or API
/// group do not match the expected parent type yield no owner.
pub fn owner_of(component: &Component, api_group: &str, kind: &str) -> Option<String> {
    component
        .owner_references()
        .iter()
        .find(|reference| reference.controller.unwrap_or(false))
        .filter(|reference| {
            reference.kind == kind && reference.api_version.split('/').next() == Some(api_group)
        })
        .map(|reference| reference.name.clone())
}

#[derive(Default)]
struct IndexState {
    /// (namespace, owner name) -> child names
    by_owner: HashMap<(String, String), BTreeSet<String>>,
    /// (namespace, child name) -> owner name
    by_child: HashMap<(String, String), String>,
}

impl IndexState {
    fn upsert(&mut self, namespace: String, child: String, owner: Option<String>) {
        let child_key = (namespace.clone(), child.clone());
        if let Some(previous) = self.by_child.get(&child_key) {
            if Some(previous) == owner.as_ref() {
                return;
            }
            let previous = previous.clone();
            self.drop_child(&child_key, &previous);
        }
        if let Some(owner) = owner {
            self.by_owner
                .entry((namespace, owner.clone()))
                .or_default()
                .insert(child.clone());
            self.by_child.insert(child_key, owner);
        }
    }

    fn remove(&mut self, namespace: &str, child: &str) {
        let child_key = (namespace.to_string(), child.to_string());
        if let Some(owner) = self.by_child.get(&child_key) {
            let owner = owner.clone();
            self.drop_child(&child_key, &owner);
        }
    }

    fn drop_child(&mut self, child_key: &(String, String), owner: &str) {
        self.by_child.remove(child_key);
        let owner_key = (child_key.0.clone(), owner.to_string());
        if let Some(children) = self.by_owner.get_mut(&owner_key) {
            children.remove(&child_key.1);
            if children.is_empty() {
                self.by_owner.remove(&owner_key);
            }
        }
    }
}

/// Continuously-maintained child-to-owner index
pub struct OwnerIndex {
    owner_api_group: String,
    owner_kind: String,
    live: RwLock<IndexState>,
    staging: Mutex<Option<IndexState>>,
}

impl OwnerIndex {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            owner_api_group: config.owner_api_group.clone(),
            owner_kind: config.owner_kind.clone(),
            live: RwLock::new(IndexState::default()),
            staging: Mutex::new(None),
        }
    }

    /// Fold one watch event into the index
    pub fn observe(&self, event: Event<Component>) {
        match event {
            Event::Apply(component) => {
                let owner = self.extract(&component);
                if let Some((namespace, name)) = object_key(&component) {
                    self.live.write().upsert(namespace, name, owner);
                }
            }
            Event::Delete(component) => {
                if let Some((namespace, name)) = object_key(&component) {
                    self.live.write().remove(&namespace, &name);
                }
            }
            Event::Init => {
                *self.staging.lock() = Some(IndexState::default());
            }
            Event::InitApply(component) => {
                let owner = self.extract(&component);
                if let Some(state) = self.staging.lock().as_mut() {
                    if let Some((namespace, name)) = object_key(&component) {
                        state.upsert(namespace, name, owner);
                    }
                }
            }
            Event::InitDone => {
                if let Some(state) = self.staging.lock().take() {
                    *self.live.write() = state;
                }
            }
        }
    }

    /// Names of all children currently indexed for the given composition
    pub fn children_of(&self, namespace: &str, owner: &str) -> Vec<String> {
        self.live
            .read()
            .by_owner
            .get(&(namespace.to_string(), owner.to_string()))
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn extract(&self, component: &Component) -> Option<String> {
        owner_of(component, &self.owner_api_group, &self.owner_kind)
    }
}

fn object_key(component: &Component) -> Option<(String, String)> {
    let namespace = component.namespace()?;
    let name = component.metadata.name.clone()?;
    Some((namespace, name))
}

/// Watch Components cluster-wide and keep the index current.
///
/// Watch errors are logged and the stream resumes under its own backoff.
pub async fn run_index_watcher(client: Client, index: Arc<OwnerIndex>) {
    let api: Api<Component> = Api::all(client);
    info!("Starting component owner index watcher");

    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => index.observe(event),
            Err(error) => warn!(error = %error, "Owner index watch error"),
        }
    }
}
