// packages/bridge/src/interception/broker.rs
//! Registration broker for resolver channels
//!
//! Tracks which resolver endpoints are reachable. Selection is
//! last-registered-wins: the newest resolver is taken to be the active
//! consumer context, older ones are only used once it goes away.

use crate::channel::message::ChannelId;
use crate::channel::port::PortSender;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

/// A registered resolver channel
#[derive(Debug, Clone)]
pub struct ResolverRegistration {
    pub channel_id: ChannelId,
    pub sender: PortSender,
    pub registered_at: DateTime<Utc>,
}

/// Registry of live resolver channels, in registration order
pub struct RegistrationBroker {
    registrations: RwLock<Vec<ResolverRegistration>>,
}

impl RegistrationBroker {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
        }
    }

    /// Store a channel under a fresh id
    pub fn register(&self, sender: PortSender) -> ChannelId {
        let channel_id = ChannelId::generate();
        let mut registrations = self.registrations.write();

        registrations.push(ResolverRegistration {
            channel_id: channel_id.clone(),
            sender,
            registered_at: Utc::now(),
        });

        info!("Registered resolver channel {}", channel_id);
        metrics::counter!("bridge_registrations_total").increment(1);
        metrics::gauge!("bridge_registered_channels").set(registrations.len() as f64);

        channel_id
    }

    /// Remove a channel; unknown ids are ignored
    pub fn unregister(&self, channel_id: &ChannelId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.channel_id != *channel_id);
        let removed = registrations.len() != before;

        if removed {
            info!("Unregistered resolver channel {}", channel_id);
            metrics::counter!("bridge_unregistrations_total").increment(1);
            metrics::gauge!("bridge_registered_channels").set(registrations.len() as f64);
        } else {
            debug!("Channel {} was not registered", channel_id);
        }

        removed
    }

    /// Most recently registered channel that is still open
    pub fn select_channel(&self) -> Option<ResolverRegistration> {
        let registrations = self.registrations.read();

        let selected = registrations
            .iter()
            .rev()
            .find(|r| !r.sender.is_closed())
            .cloned();

        match &selected {
            Some(r) => debug!("Selected resolver channel {}", r.channel_id),
            None => debug!("No live resolver channel"),
        }

        selected
    }

    /// Drop registrations whose channel already closed
    pub fn evict_closed(&self) -> usize {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| !r.sender.is_closed());
        let evicted = before - registrations.len();

        if evicted > 0 {
            info!("Evicted {} closed resolver channels", evicted);
            metrics::gauge!("bridge_registered_channels").set(registrations.len() as f64);
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Registered ids, oldest first
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.registrations
            .read()
            .iter()
            .map(|r| r.channel_id.clone())
            .collect()
    }
}

impl Default for RegistrationBroker {
    fn default() -> Self {
        Self::new()
    }
}
