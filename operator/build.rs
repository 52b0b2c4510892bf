use fleet_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/fleet.gpu-operator.io_physicalnode_crd.yaml",
        serde_yaml::to_string(&PhysicalNode::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/fleet.gpu-operator.io_slurmjob_crd.yaml",
        serde_yaml::to_string(&SlurmJob::crd()).unwrap(),
    )
    .unwrap();
}
