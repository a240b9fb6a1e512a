use noobaa_operator::api::{
    account::NooBaaAccount,
    bucket_class::BucketClass,
    obc::{ObjectBucket, ObjectBucketClaim},
    store::{BackingStore, NamespaceStore},
    system::NooBaa,
};
use stackable_operator::kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        NooBaa::crd(),
        BackingStore::crd(),
        NamespaceStore::crd(),
        BucketClass::crd(),
        NooBaaAccount::crd(),
        ObjectBucketClaim::crd(),
        ObjectBucket::crd(),
    ];
    for (idx, crd) in crds.iter().enumerate() {
        if idx > 0 {
            println!("---");
        }
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
