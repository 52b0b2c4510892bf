//! Orchestrator adapter: the capability surface the core consumes, backed
//! directly by a `kube::Client`. Not-found is distinguished from other
//! errors at this boundary so callers never have to inspect HTTP codes.

use fleet_types::{PhysicalNode, PhysicalNodeStatus, SlurmJob, SlurmJobStatus};
use k8s_openapi::api::core::v1::{Event, Node, Pod};
use kube::api::{DeleteParams, ListParams, Preconditions, PropagationPolicy};
use kube::{Api, Client};

use crate::util::patch::patch_status;
use crate::util::Error;

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

#[derive(Clone)]
pub struct OrchestratorAdapter {
    client: Client,
}

impl OrchestratorAdapter {
    pub fn new(client: Client) -> Self {
        OrchestratorAdapter { client }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    pub async fn update_node(&self, node: &Node) -> Result<Node, Error> {
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::MissingKey("metadata.name".into()))?;
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api
            .replace(name, &kube::api::PostParams::default(), node)
            .await?)
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    pub async fn delete_pod(&self, namespace: &str, name: &str, uid: &str) -> Result<bool, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            preconditions: Some(Preconditions { uid: Some(uid.to_string()), resource_version: None }),
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_event(&self, namespace: &str, event: &Event) -> Result<Event, Error> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&kube::api::PostParams::default(), event).await?)
    }

    pub async fn list_physical_nodes(&self, namespace: &str) -> Result<Vec<PhysicalNode>, Error> {
        let api: Api<PhysicalNode> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    pub async fn create_physical_node(&self, namespace: &str, node: &PhysicalNode) -> Result<PhysicalNode, Error> {
        let api: Api<PhysicalNode> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&kube::api::PostParams::default(), node).await?)
    }

    pub async fn update_physical_node(&self, node: &PhysicalNode) -> Result<PhysicalNode, Error> {
        let namespace = node
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::MissingKey("metadata.namespace".into()))?;
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::MissingKey("metadata.name".into()))?;
        let api: Api<PhysicalNode> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.replace(name, &kube::api::PostParams::default(), node).await?)
    }

    pub async fn update_physical_node_status(
        &self,
        instance: &PhysicalNode,
        status: PhysicalNodeStatus,
    ) -> Result<PhysicalNode, Error> {
        patch_status(self.client.clone(), instance, move |s: &mut PhysicalNodeStatus| *s = status).await
    }

    pub async fn list_slurm_jobs(&self, namespace: &str) -> Result<Vec<SlurmJob>, Error> {
        let api: Api<SlurmJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    pub async fn create_slurm_job(&self, namespace: &str, job: &SlurmJob) -> Result<SlurmJob, Error> {
        let api: Api<SlurmJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&kube::api::PostParams::default(), job).await?)
    }

    pub async fn update_slurm_job_status(
        &self,
        instance: &SlurmJob,
        status: SlurmJobStatus,
    ) -> Result<SlurmJob, Error> {
        patch_status(self.client.clone(), instance, move |s: &mut SlurmJobStatus| *s = status).await
    }

    pub async fn delete_slurm_job(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<SlurmJob> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
