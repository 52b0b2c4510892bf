//! Derives the physical-node identifier used as the `PhysicalNode` resource
//! name from a cluster `Node`, under whichever identifier mode the operator
//! was started with.

use k8s_openapi::api::core::v1::Node;

use crate::constants::{GPU_UUID_HASH_ANNOTATION, IDENTIFIER_GPU_UUID_HASH, IDENTIFIER_PHYSICAL_HOST, PHYSICAL_HOST_ANNOTATION};
use crate::util::Error;

pub fn physical_node_name(node: &Node, identifier: &str) -> Result<String, Error> {
    let annotation_key = match identifier {
        IDENTIFIER_GPU_UUID_HASH => GPU_UUID_HASH_ANNOTATION,
        IDENTIFIER_PHYSICAL_HOST => PHYSICAL_HOST_ANNOTATION,
        other => return Err(Error::InvalidIdentifier(other.to_string())),
    };

    let node_name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
    let value = node
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation_key))
        .ok_or_else(|| Error::MissingKey(format!("{annotation_key} on node {node_name}")))?;
    if value.is_empty() {
        return Err(Error::MissingKey(format!("{annotation_key} on node {node_name} is empty")));
    }
    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node_with_annotation(key: &str, value: &str) -> Node {
        let mut annotations = BTreeMap::new();
        annotations.insert(key.to_string(), value.to_string());
        Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("n0".into()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn reads_gpu_uuid_hash_annotation() {
        let node = node_with_annotation(GPU_UUID_HASH_ANNOTATION, "abc123");
        assert_eq!(physical_node_name(&node, IDENTIFIER_GPU_UUID_HASH).unwrap(), "abc123");
    }

    #[test]
    fn reads_physical_host_annotation() {
        let node = node_with_annotation(PHYSICAL_HOST_ANNOTATION, "rack-3-unit-5");
        assert_eq!(physical_node_name(&node, IDENTIFIER_PHYSICAL_HOST).unwrap(), "rack-3-unit-5");
    }

    #[test]
    fn missing_annotation_is_an_error() {
        let node = node_with_annotation("other/key", "x");
        assert!(physical_node_name(&node, IDENTIFIER_GPU_UUID_HASH).is_err());
    }

    #[test]
    fn empty_annotation_value_is_an_error() {
        let node = node_with_annotation(GPU_UUID_HASH_ANNOTATION, "");
        assert!(physical_node_name(&node, IDENTIFIER_GPU_UUID_HASH).is_err());
    }

    #[test]
    fn invalid_identifier_mode_is_an_error() {
        let node = node_with_annotation(GPU_UUID_HASH_ANNOTATION, "abc123");
        assert!(physical_node_name(&node, "bogus-mode").is_err());
    }
}
