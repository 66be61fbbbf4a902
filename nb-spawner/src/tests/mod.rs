mod lab_test;

use nb_api::v1::*;
use nb_core::prelude::*;
use nb_testutils::*;

use super::events::*;
use super::lab::*;
use super::objects::*;
use super::user_map::*;

pub fn test_resources() -> UserResources {
    UserResources {
        limits: ResourceQuantum { cpu: 1.0, memory: 3 * (1 << 30) },
        requests: ResourceQuantum { cpu: 0.25, memory: 3 * (1 << 28) },
    }
}
