use dispatch_contracts::routing::{
    DRIVER_CMD_LOCATION, DRIVER_CMD_REGISTER, DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE,
    DRIVER_SESSION_QUEUES,
};
use dispatch_contracts::{ContractError, DriverSummary, Envelope, SessionMessage, SessionParams};
use tokio_util::sync::CancellationToken;

use super::{next_frame, GatewayContext, GatewayError, SessionEnd, SessionIo};
use crate::bridge::SessionBridges;
use crate::broker::EventPublisher;
use crate::connection::SessionId;

/// Serve one driver connection until the peer leaves or `token` fires.
///
/// On connect the driver is registered as available for its package and
/// receives a `driver.cmd.register` acknowledgement. Trip offers addressed to
/// it are bridged from the trip-request queue. On the way out the session is
/// removed from the registry and, if configured, the driver is unregistered.
pub async fn run_driver_session(
    context: &GatewayContext,
    params: SessionParams,
    io: SessionIo,
    token: CancellationToken,
) -> Result<SessionEnd, GatewayError> {
    let package_slug = params.require_package()?.to_string();
    let driver_id = params.participant_id;
    let SessionIo {
        mut inbound,
        outbound,
    } = io;

    let (session_id, _) = context.registry.add(&driver_id, outbound);
    let driver = context.directory.register_driver(&driver_id, &package_slug);
    tracing::info!(%driver_id, %package_slug, "driver connected");

    if let Err(error) = acknowledge(context, &driver_id, &driver) {
        teardown(context, &driver_id, session_id);
        return Err(error);
    }

    let bridges = match SessionBridges::start(
        &context.broker,
        &context.registry,
        DRIVER_SESSION_QUEUES,
        &context.telemetry,
    ) {
        Ok(bridges) => bridges,
        Err(error) => {
            teardown(context, &driver_id, session_id);
            return Err(error.into());
        }
    };

    let end = loop {
        match next_frame(&mut inbound, &token).await {
            Ok(frame) => handle_frame(context, &driver_id, &frame),
            Err(end) => break end,
        }
    };

    bridges.shutdown().await;
    teardown(context, &driver_id, session_id);
    tracing::info!(%driver_id, ?end, "driver disconnected");
    Ok(end)
}

fn acknowledge(
    context: &GatewayContext,
    driver_id: &str,
    driver: &DriverSummary,
) -> Result<(), GatewayError> {
    let data = serde_json::to_value(driver).map_err(ContractError::Encode)?;
    context
        .registry
        .send(driver_id, &SessionMessage::new(DRIVER_CMD_REGISTER, data))?;
    Ok(())
}

fn handle_frame(context: &GatewayContext, driver_id: &str, frame: &str) {
    let message = match SessionMessage::from_text(frame) {
        Ok(message) => message,
        Err(error) => {
            context.telemetry.record_decode_failure();
            tracing::warn!(driver_id, %error, "ignoring malformed driver message");
            return;
        }
    };
    match message.kind.as_str() {
        DRIVER_CMD_LOCATION => tracing::trace!(driver_id, "location update"),
        DRIVER_CMD_TRIP_ACCEPT | DRIVER_CMD_TRIP_DECLINE => {
            if let Err(error) = forward_response(context, driver_id, &message) {
                context.telemetry.record_publish_failure();
                tracing::error!(driver_id, kind = %message.kind, %error, "could not forward driver response");
            }
        }
        other => tracing::debug!(driver_id, kind = other, "unhandled driver message"),
    }
}

/// Republish an accept/decline with the driver as owner.
fn forward_response(
    context: &GatewayContext,
    driver_id: &str,
    message: &SessionMessage,
) -> Result<(), GatewayError> {
    let payload = serde_json::to_vec(&message.data).map_err(ContractError::Encode)?;
    context
        .broker
        .publish(Envelope::from_raw(message.kind.clone(), driver_id, payload))?;
    tracing::debug!(driver_id, kind = %message.kind, "driver response forwarded");
    Ok(())
}

fn teardown(context: &GatewayContext, driver_id: &str, session_id: SessionId) {
    // A newer session of the same driver owns both entries now.
    if !context.registry.remove_session(driver_id, session_id) {
        return;
    }
    if context.config.unregister_on_disconnect {
        context.directory.unregister_driver(driver_id);
    }
}
