pub const PLACEMENT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/bucket_class/fixtures/placement.yaml"
));

pub const CACHE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/bucket_class/fixtures/cache.yaml"
));

pub const MULTI: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/bucket_class/fixtures/multi.yaml"
));
