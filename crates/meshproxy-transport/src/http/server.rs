//! HTTP endpoints served by every node

use super::types::{AnnounceRecord, SignedFrame};
use crate::message::{InboundHandler, InboundMessage};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use meshproxy_types::{DestinationAddress, LocalIdentity};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared between the HTTP endpoints and the transport handle
pub(crate) struct TransportState {
    pub(crate) local: LocalIdentity,
    pub(crate) public_url: String,
    pub(crate) peers: DashMap<DestinationAddress, AnnounceRecord>,
    pub(crate) inbound: RwLock<Option<InboundHandler>>,
}

impl TransportState {
    pub(crate) fn new(local: LocalIdentity, public_url: String) -> Self {
        Self {
            local,
            public_url,
            peers: DashMap::new(),
            inbound: RwLock::new(None),
        }
    }

    /// Cache a verified record, keeping the newest one per address
    pub(crate) fn remember(&self, record: AnnounceRecord) {
        let address = record.address();
        if address == self.local.address() {
            return;
        }
        let newer = self
            .peers
            .get(&address)
            .map(|existing| record.timestamp >= existing.timestamp)
            .unwrap_or(true);
        if newer {
            debug!(address = %address, url = %record.url, "Peer record cached");
            self.peers.insert(address, record);
        }
    }

    pub(crate) fn own_record(&self) -> AnnounceRecord {
        AnnounceRecord::new(&self.local, self.public_url.clone())
    }
}

pub(crate) fn create_router(state: Arc<TransportState>) -> Router {
    Router::new()
        .route("/mesh/deliver", post(deliver))
        .route("/mesh/announce", post(announce))
        .route("/mesh/path/:address", get(path))
        .with_state(state)
}

async fn deliver(
    State(state): State<Arc<TransportState>>,
    Json(frame): Json<SignedFrame>,
) -> StatusCode {
    let payload = match frame.open() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected frame: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if payload.destination != state.local.address() {
        debug!(destination = %payload.destination, "Frame not addressed to this node");
        return StatusCode::NOT_FOUND;
    }

    let handler = state.inbound.read().clone();
    match handler {
        Some(handler) => handler(InboundMessage {
            source: payload.source,
            destination: payload.destination,
            title: payload.title,
            content: payload.content,
            fields: payload.fields,
        }),
        None => debug!(source = %payload.source, "No inbound handler installed, dropping message"),
    }

    StatusCode::ACCEPTED
}

async fn announce(
    State(state): State<Arc<TransportState>>,
    Json(record): Json<AnnounceRecord>,
) -> StatusCode {
    if let Err(e) = record.verify() {
        warn!("Rejected announce: {}", e);
        return StatusCode::BAD_REQUEST;
    }
    state.remember(record);
    StatusCode::NO_CONTENT
}

async fn path(
    State(state): State<Arc<TransportState>>,
    Path(address): Path<String>,
) -> Result<Json<AnnounceRecord>, StatusCode> {
    let address: DestinationAddress = address.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    if address == state.local.address() {
        return Ok(Json(state.own_record()));
    }
    state
        .peers
        .get(&address)
        .map(|record| Json(record.clone()))
        .ok_or(StatusCode::NOT_FOUND)
}
