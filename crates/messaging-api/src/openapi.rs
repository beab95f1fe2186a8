//! OpenAPI document, scoped to this crate's endpoints only.

use utoipa::OpenApi;

use crate::dto::{
    AlertHookAck, ChannelConnectBody, ChannelStatusResponse, InboxMessage, InboxResponse,
    PricingProfileBody, SendRequestBody, SendResponse,
};
use crate::error::ErrorResponse;
use crate::handlers::{channel, inbox, observability, pricing, send};

#[derive(OpenApi)]
#[openapi(
    info(title = "Paid-Inbox Messaging API", version = "1.0.0"),
    paths(
        send::send,
        inbox::inbox,
        pricing::pricing_get,
        pricing::pricing_set,
        channel::channel_connect,
        channel::channel_disconnect,
        channel::channel_status,
        observability::snapshot,
        observability::alerts,
        observability::alert_hook,
    ),
    components(schemas(
        SendRequestBody,
        SendResponse,
        InboxMessage,
        InboxResponse,
        PricingProfileBody,
        ChannelConnectBody,
        ChannelStatusResponse,
        AlertHookAck,
        ErrorResponse,
    )),
    tags(
        (name = "messages", description = "send and inbox"),
        (name = "pricing", description = "per-recipient pricing profile"),
        (name = "channels", description = "external delivery channel connections"),
        (name = "observability", description = "metrics, snapshots, alerts"),
        (name = "launch", description = "launch readiness"),
    ),
)]
pub struct ApiDoc;
