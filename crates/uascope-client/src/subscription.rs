// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription bookkeeping: monitored item registry, notification routing
//! and publish acknowledgements.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use uascope_codec::services::subscription::{
    DataChangeNotification, SubscriptionAcknowledgement,
};
use uascope_codec::{DataValue, NodeId};

/// Tuning knobs for one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Requested publishing interval.
    pub publishing_interval: Duration,
    /// Publishing intervals the subscription survives without a publish.
    pub lifetime_count: u32,
    /// Publishing intervals without data before a keep-alive notification.
    pub max_keep_alive_count: u32,
    /// Max notifications per publish response (0 = no limit).
    pub max_notifications_per_publish: u32,
    /// Priority relative to the session's other subscriptions.
    pub priority: u8,
    /// Sampling interval for the monitored items (-1 ms = publishing
    /// interval); expressed as an option, `None` meaning server default.
    pub sampling_interval: Option<Duration>,
    /// Queue depth per monitored item.
    pub queue_size: u32,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            priority: 0,
            sampling_interval: None,
            queue_size: 1,
        }
    }
}

impl SubscriptionOptions {
    /// The sampling interval in the wire's millisecond form.
    pub fn sampling_interval_ms(&self) -> f64 {
        match self.sampling_interval {
            Some(interval) => interval.as_secs_f64() * 1000.0,
            None => -1.0,
        }
    }
}

/// One value change delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct DataChange {
    /// The subscription that produced the change.
    pub subscription_id: u32,
    /// The monitored node.
    pub node_id: NodeId,
    /// The new value.
    pub value: DataValue,
}

/// Caller-side handle to a subscription, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Server-assigned subscription id at creation time.
    pub id: u32,
}

/// One monitored item's bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct ItemRecord {
    pub client_handle: u32,
    pub node_id: NodeId,
    pub monitored_item_id: u32,
}

/// Everything needed to run a subscription and recreate it after reconnect.
#[derive(Debug)]
pub(crate) struct SubscriptionRecord {
    pub id: u32,
    pub options: SubscriptionOptions,
    pub items: Vec<ItemRecord>,
    pub sender: mpsc::Sender<DataChange>,
    pub pending_acks: Vec<SubscriptionAcknowledgement>,
}

/// Registry of live subscriptions, owned by the connection task.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    subscriptions: HashMap<u32, SubscriptionRecord>,
    next_client_handle: u32,
}

impl SubscriptionRegistry {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.subscriptions.keys().copied().collect()
    }

    /// Hands out a fresh client handle, unique across all subscriptions on
    /// this client.
    pub fn next_client_handle(&mut self) -> u32 {
        self.next_client_handle += 1;
        self.next_client_handle
    }

    pub fn insert(&mut self, record: SubscriptionRecord) {
        debug!(
            subscription_id = record.id,
            items = record.items.len(),
            "subscription registered"
        );
        self.subscriptions.insert(record.id, record);
    }

    pub fn remove(&mut self, id: u32) -> Option<SubscriptionRecord> {
        self.subscriptions.remove(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut SubscriptionRecord> {
        self.subscriptions.get_mut(&id)
    }

    /// Takes the subscriptions out for recreation after a reconnect. Server
    /// ids are stale at that point; the caller re-inserts fresh records with
    /// the same options, items and sender.
    pub fn drain(&mut self) -> Vec<SubscriptionRecord> {
        self.subscriptions.drain().map(|(_, record)| record).collect()
    }

    /// Collects the acknowledgements to piggyback on the next publish.
    pub fn take_acks(&mut self) -> Vec<SubscriptionAcknowledgement> {
        let mut acks = Vec::new();
        for record in self.subscriptions.values_mut() {
            acks.append(&mut record.pending_acks);
        }
        acks
    }

    /// Records a notification message's sequence number for acknowledgement
    /// and routes its data changes to the subscriber. Notifications for
    /// unknown subscriptions or client handles are logged and dropped.
    pub fn dispatch(
        &mut self,
        subscription_id: u32,
        sequence_number: u32,
        changes: &[DataChangeNotification],
        is_keep_alive: bool,
    ) {
        let Some(record) = self.subscriptions.get_mut(&subscription_id) else {
            warn!(subscription_id, "notification for unknown subscription dropped");
            return;
        };
        // Keep-alives are not acknowledged; they carry no notification.
        if !is_keep_alive {
            record.pending_acks.push(SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            });
        }

        for change in changes {
            for item in change.monitored_items.as_deref().unwrap_or(&[]) {
                let Some(known) = record
                    .items
                    .iter()
                    .find(|i| i.client_handle == item.client_handle)
                else {
                    warn!(
                        subscription_id,
                        client_handle = item.client_handle,
                        "notification for unknown client handle dropped"
                    );
                    continue;
                };
                let update = DataChange {
                    subscription_id,
                    node_id: known.node_id.clone(),
                    value: item.value.clone(),
                };
                // A slow consumer sheds load here rather than stalling the
                // connection task.
                if record.sender.try_send(update).is_err() {
                    warn!(
                        subscription_id,
                        client_handle = item.client_handle,
                        "subscriber queue full, data change dropped"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uascope_codec::services::subscription::MonitoredItemNotification;
    use uascope_codec::Variant;

    fn record_with_item(id: u32, handle: u32) -> (SubscriptionRecord, mpsc::Receiver<DataChange>) {
        let (tx, rx) = mpsc::channel(8);
        let record = SubscriptionRecord {
            id,
            options: SubscriptionOptions::default(),
            items: vec![ItemRecord {
                client_handle: handle,
                node_id: NodeId::string(1, "dynamic.double.value"),
                monitored_item_id: 9,
            }],
            sender: tx,
            pending_acks: Vec::new(),
        };
        (record, rx)
    }

    fn change_for(handle: u32, value: f64) -> DataChangeNotification {
        DataChangeNotification {
            monitored_items: Some(vec![MonitoredItemNotification {
                client_handle: handle,
                value: DataValue::value_only(Variant::Double(value)),
            }]),
            diagnostic_infos: None,
        }
    }

    #[test]
    fn test_dispatch_routes_by_client_handle() {
        let mut registry = SubscriptionRegistry::default();
        let (record, mut rx) = record_with_item(5, 1);
        registry.insert(record);

        registry.dispatch(5, 10, &[change_for(1, 2.5)], false);
        let change = rx.try_recv().unwrap();
        assert_eq!(change.node_id, NodeId::string(1, "dynamic.double.value"));
        assert_eq!(change.value.value, Some(Variant::Double(2.5)));

        let acks = registry.take_acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].sequence_number, 10);
        assert!(registry.take_acks().is_empty());
    }

    #[test]
    fn test_unknown_handles_are_dropped() {
        let mut registry = SubscriptionRegistry::default();
        let (record, mut rx) = record_with_item(5, 1);
        registry.insert(record);

        registry.dispatch(5, 11, &[change_for(99, 1.0)], false);
        assert!(rx.try_recv().is_err());
        // The sequence number is still acknowledged.
        assert_eq!(registry.take_acks().len(), 1);

        // Unknown subscription entirely.
        registry.dispatch(77, 12, &[change_for(1, 1.0)], false);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_keep_alive_is_not_acknowledged() {
        let mut registry = SubscriptionRegistry::default();
        let (record, _rx) = record_with_item(5, 1);
        registry.insert(record);

        registry.dispatch(5, 12, &[], true);
        assert!(registry.take_acks().is_empty());
    }
}
