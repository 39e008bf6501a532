// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription services: CreateSubscription, monitored item management and
//! the Publish exchange.

use crate::encoding::{
    decode_array, encode_array, BinaryDecode, BinaryEncode, Decoder, Encoder,
};
use crate::error::CodecResult;
use crate::types::{DiagnosticInfo, ExtensionObject, StatusCode, UaDateTime};
use crate::variant::DataValue;

use super::attribute::ReadValueId;
use super::{RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};

/// DefaultBinary type id of `DataChangeNotification`.
pub const DATA_CHANGE_NOTIFICATION_TYPE_ID: u32 = 811;

// =============================================================================
// CreateSubscription
// =============================================================================

/// Creates a subscription on the session.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval_ms: f64,
    /// Publishing intervals the subscription survives without a publish
    /// before the server drops it.
    pub requested_lifetime_count: u32,
    /// Publishing intervals without notifications before the server sends an
    /// empty keep-alive response.
    pub requested_max_keep_alive_count: u32,
    /// Max notifications per publish response (0 = no limit).
    pub max_notifications_per_publish: u32,
    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
    /// Relative priority among the session's subscriptions.
    pub priority: u8,
}

impl BinaryEncode for CreateSubscriptionRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_f64(self.requested_publishing_interval_ms);
        encoder.write_u32(self.requested_lifetime_count);
        encoder.write_u32(self.requested_max_keep_alive_count);
        encoder.write_u32(self.max_notifications_per_publish);
        encoder.write_bool(self.publishing_enabled);
        encoder.write_u8(self.priority);
        Ok(())
    }
}

impl ServiceRequest for CreateSubscriptionRequest {
    const TYPE_ID: u32 = 787;
    type Response = CreateSubscriptionResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`CreateSubscriptionRequest`]. The revised values are the
/// ones the server actually granted.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Granted publishing interval in milliseconds.
    pub revised_publishing_interval_ms: f64,
    /// Granted lifetime count.
    pub revised_lifetime_count: u32,
    /// Granted keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

impl BinaryDecode for CreateSubscriptionResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            subscription_id: decoder.read_u32()?,
            revised_publishing_interval_ms: decoder.read_f64()?,
            revised_lifetime_count: decoder.read_u32()?,
            revised_max_keep_alive_count: decoder.read_u32()?,
        })
    }
}

impl ServiceResponse for CreateSubscriptionResponse {
    const TYPE_ID: u32 = 790;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// DeleteSubscriptions
// =============================================================================

/// Deletes subscriptions by id.
#[derive(Debug, Clone)]
pub struct DeleteSubscriptionsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscriptions to delete.
    pub subscription_ids: Vec<u32>,
}

impl BinaryEncode for DeleteSubscriptionsRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_array_len(Some(self.subscription_ids.len()))?;
        for id in &self.subscription_ids {
            encoder.write_u32(*id);
        }
        Ok(())
    }
}

impl ServiceRequest for DeleteSubscriptionsRequest {
    const TYPE_ID: u32 = 847;
    type Response = DeleteSubscriptionsResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`DeleteSubscriptionsRequest`].
#[derive(Debug, Clone)]
pub struct DeleteSubscriptionsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per deleted subscription.
    pub results: Option<Vec<StatusCode>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for DeleteSubscriptionsResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for DeleteSubscriptionsResponse {
    const TYPE_ID: u32 = 850;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// Monitored items
// =============================================================================

/// How a monitored item samples its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitoringMode {
    /// Item exists but does not sample.
    Disabled = 0,
    /// Item samples but queues nothing.
    Sampling = 1,
    /// Item samples and reports.
    #[default]
    Reporting = 2,
}

/// Sampling parameters for a monitored item.
#[derive(Debug, Clone)]
pub struct MonitoringParameters {
    /// Client-assigned handle echoed in notifications.
    pub client_handle: u32,
    /// Sampling interval in milliseconds (-1 = the publishing interval).
    pub sampling_interval_ms: f64,
    /// Data change filter (null = report every value change).
    pub filter: ExtensionObject,
    /// Queue depth between publishes.
    pub queue_size: u32,
    /// Whether the oldest queued value is discarded on overflow.
    pub discard_oldest: bool,
}

impl MonitoringParameters {
    /// Default parameters: sample at the publishing interval, queue of one,
    /// no filter.
    pub fn with_handle(client_handle: u32) -> Self {
        Self {
            client_handle,
            sampling_interval_ms: -1.0,
            filter: ExtensionObject::null(),
            queue_size: 1,
            discard_oldest: true,
        }
    }
}

impl BinaryEncode for MonitoringParameters {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_u32(self.client_handle);
        encoder.write_f64(self.sampling_interval_ms);
        self.filter.encode(encoder)?;
        encoder.write_u32(self.queue_size);
        encoder.write_bool(self.discard_oldest);
        Ok(())
    }
}

/// One item to create on a subscription.
#[derive(Debug, Clone)]
pub struct MonitoredItemCreateRequest {
    /// The node/attribute to monitor.
    pub item_to_monitor: ReadValueId,
    /// Sampling mode.
    pub monitoring_mode: MonitoringMode,
    /// Sampling parameters.
    pub requested_parameters: MonitoringParameters,
}

impl BinaryEncode for MonitoredItemCreateRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.item_to_monitor.encode(encoder)?;
        encoder.write_u32(self.monitoring_mode as u32);
        self.requested_parameters.encode(encoder)
    }
}

/// Creation result for one monitored item.
#[derive(Debug, Clone)]
pub struct MonitoredItemCreateResult {
    /// Status for this item.
    pub status_code: StatusCode,
    /// Server-assigned monitored item id.
    pub monitored_item_id: u32,
    /// Granted sampling interval in milliseconds.
    pub revised_sampling_interval_ms: f64,
    /// Granted queue size.
    pub revised_queue_size: u32,
    /// Revised filter, if the server changed it.
    pub filter_result: ExtensionObject,
}

impl BinaryDecode for MonitoredItemCreateResult {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            status_code: StatusCode::decode(decoder)?,
            monitored_item_id: decoder.read_u32()?,
            revised_sampling_interval_ms: decoder.read_f64()?,
            revised_queue_size: decoder.read_u32()?,
            filter_result: ExtensionObject::decode(decoder)?,
        })
    }
}

/// Creates monitored items on a subscription.
#[derive(Debug, Clone)]
pub struct CreateMonitoredItemsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The target subscription.
    pub subscription_id: u32,
    /// Which timestamps the notifications carry.
    pub timestamps_to_return: super::attribute::TimestampsToReturn,
    /// The items to create.
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

impl BinaryEncode for CreateMonitoredItemsRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_u32(self.subscription_id);
        encoder.write_u32(self.timestamps_to_return as u32);
        encode_array(encoder, Some(&self.items_to_create))
    }
}

impl ServiceRequest for CreateMonitoredItemsRequest {
    const TYPE_ID: u32 = 751;
    type Response = CreateMonitoredItemsResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`CreateMonitoredItemsRequest`]. Results are positional.
#[derive(Debug, Clone)]
pub struct CreateMonitoredItemsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per requested item.
    pub results: Option<Vec<MonitoredItemCreateResult>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for CreateMonitoredItemsResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for CreateMonitoredItemsResponse {
    const TYPE_ID: u32 = 754;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

/// Deletes monitored items from a subscription.
#[derive(Debug, Clone)]
pub struct DeleteMonitoredItemsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The owning subscription.
    pub subscription_id: u32,
    /// Server-assigned ids of the items to delete.
    pub monitored_item_ids: Vec<u32>,
}

impl BinaryEncode for DeleteMonitoredItemsRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encoder.write_u32(self.subscription_id);
        encoder.write_array_len(Some(self.monitored_item_ids.len()))?;
        for id in &self.monitored_item_ids {
            encoder.write_u32(*id);
        }
        Ok(())
    }
}

impl ServiceRequest for DeleteMonitoredItemsRequest {
    const TYPE_ID: u32 = 781;
    type Response = DeleteMonitoredItemsResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// Response to [`DeleteMonitoredItemsRequest`].
#[derive(Debug, Clone)]
pub struct DeleteMonitoredItemsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per deleted item.
    pub results: Option<Vec<StatusCode>>,
    /// Per-result diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for DeleteMonitoredItemsResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            response_header: ResponseHeader::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for DeleteMonitoredItemsResponse {
    const TYPE_ID: u32 = 784;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// Publish
// =============================================================================

/// Acknowledges one notification message on one subscription.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionAcknowledgement {
    /// The subscription the notification came from.
    pub subscription_id: u32,
    /// The sequence number being acknowledged.
    pub sequence_number: u32,
}

impl BinaryEncode for SubscriptionAcknowledgement {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        encoder.write_u32(self.subscription_id);
        encoder.write_u32(self.sequence_number);
        Ok(())
    }
}

/// Asks the server for the next notification message on any subscription.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Notifications received since the last publish.
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

impl BinaryEncode for PublishRequest {
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()> {
        self.request_header.encode(encoder)?;
        encode_array(encoder, Some(&self.subscription_acknowledgements))
    }
}

impl ServiceRequest for PublishRequest {
    const TYPE_ID: u32 = 826;
    type Response = PublishResponse;

    fn request_header(&self) -> &RequestHeader {
        &self.request_header
    }
}

/// One data change inside a notification message.
#[derive(Debug, Clone)]
pub struct MonitoredItemNotification {
    /// The client handle assigned at item creation.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

impl BinaryDecode for MonitoredItemNotification {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            client_handle: decoder.read_u32()?,
            value: DataValue::decode(decoder)?,
        })
    }
}

/// Body of a `DataChangeNotification` extension object.
#[derive(Debug, Clone)]
pub struct DataChangeNotification {
    /// The changed values.
    pub monitored_items: Option<Vec<MonitoredItemNotification>>,
    /// Per-item diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for DataChangeNotification {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            monitored_items: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

/// A sequenced batch of notifications for one subscription. An empty
/// notification list is a subscription keep-alive.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// Server-assigned sequence number, to acknowledge on the next publish.
    pub sequence_number: u32,
    /// When the message was produced.
    pub publish_time: UaDateTime,
    /// The notifications, as extension objects. Data changes use type id
    /// [`DATA_CHANGE_NOTIFICATION_TYPE_ID`]; other kinds are skipped by
    /// callers.
    pub notification_data: Option<Vec<ExtensionObject>>,
}

impl NotificationMessage {
    /// Returns `true` if this message carries no notifications.
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.as_deref().map_or(true, <[_]>::is_empty)
    }

    /// Decodes every data change notification in this message, skipping
    /// other notification kinds.
    pub fn data_changes(&self) -> CodecResult<Vec<DataChangeNotification>> {
        let mut changes = Vec::new();
        for obj in self.notification_data.as_deref().unwrap_or(&[]) {
            if obj.type_id.as_numeric() == Some(DATA_CHANGE_NOTIFICATION_TYPE_ID)
                && obj.type_id.namespace == 0
            {
                changes.push(obj.decode_body(DATA_CHANGE_NOTIFICATION_TYPE_ID)?);
            }
        }
        Ok(changes)
    }
}

impl BinaryDecode for NotificationMessage {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            sequence_number: decoder.read_u32()?,
            publish_time: UaDateTime::decode(decoder)?,
            notification_data: decode_array(decoder)?,
        })
    }
}

/// Response to [`PublishRequest`].
#[derive(Debug, Clone)]
pub struct PublishResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The subscription the notification message belongs to.
    pub subscription_id: u32,
    /// Sequence numbers of messages the server still holds for retransmit.
    pub available_sequence_numbers: Option<Vec<u32>>,
    /// Whether the server had more notifications than fit in this response.
    pub more_notifications: bool,
    /// The notification message.
    pub notification_message: NotificationMessage,
    /// One status per acknowledgement in the request.
    pub results: Option<Vec<StatusCode>>,
    /// Per-acknowledgement diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl BinaryDecode for PublishResponse {
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let response_header = ResponseHeader::decode(decoder)?;
        let subscription_id = decoder.read_u32()?;
        let available_sequence_numbers = match decoder.read_array_len()? {
            None => None,
            Some(len) => {
                let mut numbers = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    numbers.push(decoder.read_u32()?);
                }
                Some(numbers)
            }
        };
        Ok(Self {
            response_header,
            subscription_id,
            available_sequence_numbers,
            more_notifications: decoder.read_bool()?,
            notification_message: NotificationMessage::decode(decoder)?,
            results: decode_array(decoder)?,
            diagnostic_infos: decode_array(decoder)?,
        })
    }
}

impl ServiceResponse for PublishResponse {
    const TYPE_ID: u32 = 829;

    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{decode_message, encode_message, DecodedResponse};
    use crate::types::NodeId;
    use crate::variant::Variant;

    #[test]
    fn test_create_subscription_envelope_type_id() {
        let request = CreateSubscriptionRequest {
            request_header: RequestHeader::new(NodeId::null(), 6, 5000),
            requested_publishing_interval_ms: 500.0,
            requested_lifetime_count: 60,
            requested_max_keep_alive_count: 20,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        };
        let bytes = encode_message(&request).unwrap();
        // Four-byte NodeId form for i=787.
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0x13, 0x03]);
    }

    fn encode_publish_response(notifications: Option<Vec<ExtensionObject>>) -> Vec<u8> {
        let mut encoder = Encoder::new();
        NodeId::numeric(0, PublishResponse::TYPE_ID)
            .encode(&mut encoder)
            .unwrap();
        ResponseHeader::default().encode(&mut encoder).unwrap();
        encoder.write_u32(33); // subscription id
        encoder.write_array_len(Some(1)).unwrap();
        encoder.write_u32(5); // available sequence number
        encoder.write_bool(false); // more notifications
        encoder.write_u32(5); // sequence number
        UaDateTime::now().encode(&mut encoder).unwrap();
        match notifications {
            None => encoder.write_array_len(None).unwrap(),
            Some(objs) => {
                encoder.write_array_len(Some(objs.len())).unwrap();
                for obj in &objs {
                    obj.encode(&mut encoder).unwrap();
                }
            }
        }
        encoder.write_array_len(None).unwrap(); // results
        encoder.write_array_len(None).unwrap(); // diagnostics
        encoder.finish()
    }

    #[test]
    fn test_publish_keep_alive() {
        let bytes = encode_publish_response(None);
        match decode_message::<PublishResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                assert_eq!(resp.subscription_id, 33);
                assert!(resp.notification_message.is_keep_alive());
                assert!(resp.notification_message.data_changes().unwrap().is_empty());
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }

    #[test]
    fn test_publish_data_change_extraction() {
        // Build a DataChangeNotification body by hand.
        let mut body = Encoder::new();
        body.write_array_len(Some(1)).unwrap();
        body.write_u32(77); // client handle
        DataValue::value_only(Variant::Double(1.5))
            .encode(&mut body)
            .unwrap();
        body.write_array_len(None).unwrap(); // diagnostics
        let obj = ExtensionObject::binary(
            NodeId::numeric(0, DATA_CHANGE_NOTIFICATION_TYPE_ID),
            body.finish(),
        );

        let bytes = encode_publish_response(Some(vec![obj]));
        match decode_message::<PublishResponse>(&bytes).unwrap() {
            DecodedResponse::Response(resp) => {
                assert!(!resp.notification_message.is_keep_alive());
                let changes = resp.notification_message.data_changes().unwrap();
                assert_eq!(changes.len(), 1);
                let items = changes[0].monitored_items.as_deref().unwrap();
                assert_eq!(items[0].client_handle, 77);
                assert_eq!(items[0].value.value, Some(Variant::Double(1.5)));
            }
            DecodedResponse::Fault(_) => panic!("unexpected fault"),
        }
    }
}
