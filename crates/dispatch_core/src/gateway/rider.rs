use dispatch_contracts::routing::RIDER_SESSION_QUEUES;
use dispatch_contracts::SessionParams;
use tokio_util::sync::CancellationToken;

use super::{next_frame, GatewayContext, GatewayError, SessionEnd, SessionIo};
use crate::bridge::SessionBridges;

/// Serve one rider connection: push no-drivers-found and driver-assigned
/// notifications until the peer leaves or `token` fires. Riders send nothing
/// the pipeline acts on; inbound frames are only logged.
pub async fn run_rider_session(
    context: &GatewayContext,
    params: SessionParams,
    io: SessionIo,
    token: CancellationToken,
) -> Result<SessionEnd, GatewayError> {
    let rider_id = params.participant_id;
    let SessionIo {
        mut inbound,
        outbound,
    } = io;

    let (session_id, _) = context.registry.add(&rider_id, outbound);
    let bridges = match SessionBridges::start(
        &context.broker,
        &context.registry,
        RIDER_SESSION_QUEUES,
        &context.telemetry,
    ) {
        Ok(bridges) => bridges,
        Err(error) => {
            context.registry.remove_session(&rider_id, session_id);
            return Err(error.into());
        }
    };
    tracing::info!(%rider_id, "rider connected");

    let end = loop {
        match next_frame(&mut inbound, &token).await {
            Ok(frame) => tracing::debug!(%rider_id, %frame, "rider message"),
            Err(end) => break end,
        }
    };

    bridges.shutdown().await;
    context.registry.remove_session(&rider_id, session_id);
    tracing::info!(%rider_id, ?end, "rider disconnected");
    Ok(end)
}
