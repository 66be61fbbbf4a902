mod context;
mod errors;
mod events;
mod form;
mod lab;
mod objects;
mod routes;
mod user_map;

use std::net::{
    IpAddr,
    Ipv4Addr,
};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nb_core::config::Config;
use nb_core::errors::*;
use nb_core::prelude::*;
use nb_core::{
    docker,
    logging,
};
use nb_core::identity::IdentityClient;
use nb_prepuller::Prepuller;
use tokio::sync::watch;
use tracing::*;

use crate::context::ServiceContext;
use crate::events::EventBroker;
use crate::lab::LabManager;
use crate::user_map::UserMap;

#[derive(Clone, Debug, Parser)]
struct Options {
    #[arg(long, default_value = CONFIGURATION_PATH)]
    config_file: String,

    #[arg(long, default_value = DOCKER_SECRETS_PATH)]
    docker_secrets_path: String,

    // The gateway hosting the identity service endpoints
    #[arg(long, default_value = "http://gafaelfawr.gafaelfawr:8080")]
    auth_url: String,

    #[arg(long, default_value_t = 8080)]
    server_port: u16,

    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[instrument(ret, err)]
async fn run(opts: Options) -> EmptyResult {
    let config = Arc::new(Config::load(&opts.config_file)?);
    let docker_credentials = docker::load_credentials(&opts.docker_secrets_path)?;
    info!("loaded docker credentials for {} registries", docker_credentials.len());

    let mut kube_config = kube::Config::infer().await?;
    kube_config.read_timeout = Some(Duration::from_secs(config.kubernetes.request_timeout));
    let client = kube::Client::try_from(kube_config)?;

    let user_map = UserMap::new();
    let events = EventBroker::new(user_map.clone());
    let prepuller = Arc::new(Prepuller::new(client.clone(), config.prepuller.config.clone()));
    let lab_manager = LabManager::new(
        client.clone(),
        config.clone(),
        user_map.clone(),
        events.clone(),
        prepuller.clone(),
    );
    let identity = IdentityClient::new(&opts.auth_url)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = prepuller.clone();
    let prepull_task = tokio::spawn(async move { reconciler.run(shutdown_rx).await });

    let ctx = ServiceContext {
        config,
        user_map,
        events,
        lab_manager,
        prepuller,
        identity,
    };
    let rkt_config = rocket::Config {
        address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        port: opts.server_port,
        ..Default::default()
    };
    let server = rocket::custom(&rkt_config).mount(API_BASE_PATH, routes::all()).manage(ctx);

    // Rocket handles the termination signals; once it winds down, tell the
    // reconciler to close up shop too
    let res = server.launch().await;
    let _ = shutdown_tx.send(true);
    prepull_task.await?;
    res.map(|_| ()).map_err(|e| e.into())
}

#[tokio::main]
async fn main() {
    let args = Options::parse();
    logging::setup(&format!("{},rocket=warn", args.verbosity));
    if let Err(err) = run(args).await {
        error!("spawner failed: {err:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests;
