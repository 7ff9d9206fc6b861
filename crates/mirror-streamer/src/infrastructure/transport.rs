//! Transport factory for builds without a peer-connection engine.
//!
//! Every offer is refused with [`TransportError::Unavailable`]; the
//! coordinator logs it and returns to `Idle`.  Capture, signaling and the
//! injection bridge keep running, so the process is still useful for
//! checking the device side of the setup.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::transport::{
    TransportError, TransportEvents, TransportFactory, TransportSession,
};
use crate::domain::SessionId;

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTransportFactory;

#[async_trait]
impl TransportFactory for UnavailableTransportFactory {
    async fn open(
        &self,
        _session: SessionId,
        _events: TransportEvents,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        Err(TransportError::Unavailable)
    }
}
