use kube::CustomResourceExt;
use std::fs;
use storm_types::*;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/storm.apache.org_stormclusters_crd.yaml",
        serde_yaml::to_string(&StormCluster::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/storm.apache.org_stormtopologies_crd.yaml",
        serde_yaml::to_string(&StormTopology::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/storm.apache.org_stormworkerpools_crd.yaml",
        serde_yaml::to_string(&StormWorkerPool::crd()).unwrap(),
    )
    .unwrap();
}
