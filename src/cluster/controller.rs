use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::{
    cluster::error::{Error, Result},
    wire::{BrokerWire, WireError},
};

/// Connect to the controller of the cluster behind `bootstrap_brokers`.
///
/// Bootstrap brokers are tried in random order until one answers; that broker is asked for the
/// controller address. Its handle is reused if it is the controller itself and closed otherwise.
/// Both the bootstrap search and the controller dial are bounded by `dial_timeout`.
pub(crate) async fn dial_controller<W>(
    wire: &W,
    bootstrap_brokers: &[String],
    dial_timeout: Duration,
) -> Result<W::Handle>
where
    W: BrokerWire,
{
    if bootstrap_brokers.is_empty() {
        return Err(Error::NoBrokers);
    }

    // Randomise search order to encourage different clients to choose different brokers
    let mut brokers = bootstrap_brokers.to_vec();
    brokers.shuffle(&mut rand::rng());

    let (bootstrap, handle) = tokio::time::timeout(dial_timeout, dial_any(wire, &brokers))
        .await
        .unwrap_or(Err(WireError::Timeout(dial_timeout)))
        .map_err(|source| Error::Dial {
            brokers: bootstrap_brokers.to_vec(),
            source,
        })?;

    let controller = match tokio::time::timeout(dial_timeout, wire.controller_address(&handle))
        .await
        .unwrap_or(Err(WireError::Timeout(dial_timeout)))
    {
        Ok(controller) => controller,
        Err(e) => {
            wire.close(handle).await;
            return Err(Error::ControllerLookup(e));
        }
    };

    if controller == bootstrap {
        debug!(broker = bootstrap.as_str(), "bootstrap broker is the controller");
        return Ok(handle);
    }

    info!(
        bootstrap = bootstrap.as_str(),
        controller = controller.as_str(),
        "Connecting to controller",
    );
    let result = tokio::time::timeout(dial_timeout, wire.dial(&controller))
        .await
        .unwrap_or(Err(WireError::Timeout(dial_timeout)));
    wire.close(handle).await;

    result.map_err(Error::ControllerLookup)
}

async fn dial_any<W>(wire: &W, brokers: &[String]) -> Result<(String, W::Handle), WireError>
where
    W: BrokerWire,
{
    let mut last_error = None;

    for broker in brokers {
        info!(url = broker.as_str(), "Establishing new connection");
        match wire.dial(broker).await {
            Ok(handle) => return Ok((broker.clone(), handle)),
            Err(e) => {
                warn!(%e, url = broker.as_str(), "Failed to connect to broker");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| WireError::client("no broker to connect to")))
}
