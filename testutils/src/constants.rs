pub const TEST_USER: &str = "ribbon";
pub const TEST_USER_NAME: &str = "Ribbon";
pub const TEST_UID: i64 = 1104;
pub const TEST_GID: i64 = 1104;
pub const TEST_GROUP: &str = "ferrymen";
pub const TEST_TOKEN: &str = "gt-t0k3n";

pub const TEST_NODE_1: &str = "node1";
pub const TEST_NODE_2: &str = "node2";

pub const TEST_REPO: &str = "lighthouse.ceres/library/sketchbook";
pub const TEST_DIGEST: &str = "sha256:419c4b7e14603711b25fa9e0569460a753c4b2449fe275bb5f89743b01794a30";
pub const TEST_DIGEST_2: &str = "sha256:b69596369abd964851f4c700fb186cbb172ea36d671cd4fcc24b7aa42fb6e6b8";

pub const TEST_CTRL_NAMESPACE: &str = "nublado";
