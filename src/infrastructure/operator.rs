//! # Operator Notices
//!
//! Delivers operator notices as ordinary messages into the operator's room over
//! whatever transport session is live.

use async_trait::async_trait;

use crate::application::handle::TransportHandleProvider;
use crate::domain::errors::DeliveryError;
use crate::domain::traits::OperatorSink;
use crate::domain::types::OutboundPayload;

pub struct SessionOperatorSink {
    handle: TransportHandleProvider,
}

impl SessionOperatorSink {
    pub fn new(handle: TransportHandleProvider) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl OperatorSink for SessionOperatorSink {
    async fn notify(&self, operator: &str, text: &str) -> Result<(), DeliveryError> {
        let session = self.handle.require()?;
        session
            .send(operator, &OutboundPayload::text(text))
            .await
            .map(|_| ())
    }
}
