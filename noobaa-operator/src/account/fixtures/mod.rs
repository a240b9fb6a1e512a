pub const ACCOUNT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/account/fixtures/account.yaml"
));
