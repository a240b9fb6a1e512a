pub const SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/system/fixtures/system.yaml"
));

pub const JOIN_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/system/fixtures/join_system.yaml"
));
