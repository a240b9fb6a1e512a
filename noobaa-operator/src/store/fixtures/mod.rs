pub const AWS_BACKING_STORE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/store/fixtures/aws_backing_store.yaml"
));

pub const AMBIGUOUS_BACKING_STORE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/store/fixtures/ambiguous_backing_store.yaml"
));

pub const PV_POOL_BACKING_STORE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/store/fixtures/pv_pool_backing_store.yaml"
));

pub const NSFS_NAMESPACE_STORE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/store/fixtures/nsfs_namespace_store.yaml"
));

pub const NSFS_MISSING_SPEC: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/store/fixtures/nsfs_missing_spec.yaml"
));
