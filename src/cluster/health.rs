use tracing::{debug, info, warn};

use crate::{
    cluster::{
        ClusterConnection, ConnectionStatus,
        controller::dial_controller,
        error::{Error, Result},
    },
    wire::BrokerWire,
};

impl<W> ClusterConnection<W>
where
    W: BrokerWire,
{
    /// Makes sure `slot` holds a live controller connection.
    ///
    /// Probes the current handle; if that fails (or there is none) the handle is dropped and a full
    /// reconnect through the bootstrap brokers is attempted once. If that fails too the connection
    /// stays disconnected and the next operation tries again.
    pub(super) async fn ensure_healthy<'a>(
        &self,
        slot: &'a mut Option<W::Handle>,
    ) -> Result<&'a W::Handle> {
        match slot.take() {
            Some(handle) => match self.call(self.wire.probe(&handle)).await {
                Ok(()) => return Ok(slot.insert(handle)),
                Err(e) => {
                    warn!(
                        %e,
                        brokers = ?self.bootstrap_brokers,
                        "Connection probe failed, reconnecting",
                    );
                    self.wire.close(handle).await;
                    self.set_status(ConnectionStatus::Disconnected);
                }
            },
            None => debug!("No live connection, reconnecting"),
        }

        self.set_status(ConnectionStatus::Connecting);
        match dial_controller(
            self.wire.as_ref(),
            &self.bootstrap_brokers,
            self.config.dial_timeout,
        )
        .await
        {
            Ok(handle) => {
                info!(brokers = ?self.bootstrap_brokers, "Reconnected to cluster");
                self.set_status(ConnectionStatus::Connected);
                Ok(slot.insert(handle))
            }
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                Err(Error::ConnectionLost(Box::new(e)))
            }
        }
    }
}
