use std::sync::Arc;

use nb_core::config::Config;
use nb_core::identity::IdentityClient;
use nb_prepuller::Prepuller;

use crate::events::EventBroker;
use crate::lab::LabManager;
use crate::user_map::UserMap;

/// Everything the HTTP surface needs, created once at boot and handed to
/// rocket as managed state.  No ambient singletons anywhere.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<Config>,
    pub user_map: UserMap,
    pub events: EventBroker,
    pub lab_manager: LabManager,
    pub prepuller: Arc<Prepuller>,
    pub identity: IdentityClient,
}
