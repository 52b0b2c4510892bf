use super::MANAGER_NAME;
use fleet_types::{PhysicalNode, PhysicalNodeStatus, SlurmJob, SlurmJobStatus};
use kube::{
    Api, Client,
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use super::Error;

/// A namespaced custom resource whose status type can be reached mutably,
/// initializing it to the default value on first write.
pub trait Object<S> {
    fn mut_status(&mut self) -> &mut S;
}

impl Object<PhysicalNodeStatus> for PhysicalNode {
    fn mut_status(&mut self) -> &mut PhysicalNodeStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Object<SlurmJobStatus> for SlurmJob {
    fn mut_status(&mut self) -> &mut SlurmJobStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Diff `instance` against the result of applying `f` to its status and
/// send the difference as a JSON merge patch against the status
/// subresource. Returns the server's view of the updated object.
pub async fn patch_status<S, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let mut modified = instance.clone();
    f(modified.mut_status());

    let patch = Patch::Json::<T>(json_patch::diff(
        &serde_json::to_value(instance)?,
        &serde_json::to_value(&modified)?,
    ));

    let name = instance
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| Error::MissingKey("metadata.name".into()))?;
    let namespace = instance
        .meta()
        .namespace
        .as_deref()
        .ok_or_else(|| Error::MissingKey("metadata.namespace".into()))?;
    let api: Api<T> = Api::namespaced(client, namespace);
    Ok(api
        .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}
