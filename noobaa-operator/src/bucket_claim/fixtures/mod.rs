pub const CLAIM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/bucket_claim/fixtures/claim.yaml"
));

pub const OBJECT_BUCKET: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/bucket_claim/fixtures/object_bucket.yaml"
));
