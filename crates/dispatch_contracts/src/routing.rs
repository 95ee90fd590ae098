//! Routing keys and queue names.
//!
//! Routing keys classify an envelope's event kind; queues are what consumers
//! subscribe to. [`QUEUE_BINDINGS`] is the production topology binding each
//! queue to the routing keys it receives.

/// A trip was created and needs a driver.
pub const TRIP_EVENT_CREATED: &str = "trip.created";
/// The offered driver declined; the trip needs another round of matching.
pub const TRIP_EVENT_DRIVER_NOT_INTERESTED: &str = "trip.driverNotInterested";
/// No driver of the requested package is available. Addressed to the rider.
pub const TRIP_EVENT_NO_DRIVERS_FOUND: &str = "trip.noDriversFound";
/// A driver accepted the trip. Addressed to the rider.
pub const TRIP_EVENT_DRIVER_ASSIGNED: &str = "notify.driver.assign";

/// Trip offer addressed to a single driver.
pub const DRIVER_CMD_TRIP_REQUEST: &str = "driver.cmd.tripRequest";
pub const DRIVER_CMD_TRIP_ACCEPT: &str = "driver.cmd.tripAccept";
pub const DRIVER_CMD_TRIP_DECLINE: &str = "driver.cmd.tripDecline";
/// Registration acknowledgement pushed to a driver when its session opens.
pub const DRIVER_CMD_REGISTER: &str = "driver.cmd.register";
/// Location update sent by a driver. Accepted and ignored for now.
pub const DRIVER_CMD_LOCATION: &str = "driver.cmd.location";

pub const FIND_AVAILABLE_DRIVERS_QUEUE: &str = "find_available_drivers";
pub const DRIVER_TRIP_RESPONSE_QUEUE: &str = "driver_trip_response";
pub const DRIVER_CMD_TRIP_REQUEST_QUEUE: &str = "driver_cmd_trip_request";
pub const NOTIFY_NO_DRIVERS_FOUND_QUEUE: &str = "notify_no_drivers_found";
pub const NOTIFY_DRIVER_ASSIGN_QUEUE: &str = "notify_driver_assign";

/// Queue name → routing keys delivered to it.
pub const QUEUE_BINDINGS: &[(&str, &[&str])] = &[
    (
        FIND_AVAILABLE_DRIVERS_QUEUE,
        &[TRIP_EVENT_CREATED, TRIP_EVENT_DRIVER_NOT_INTERESTED],
    ),
    (
        DRIVER_TRIP_RESPONSE_QUEUE,
        &[DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE],
    ),
    (DRIVER_CMD_TRIP_REQUEST_QUEUE, &[DRIVER_CMD_TRIP_REQUEST]),
    (NOTIFY_NO_DRIVERS_FOUND_QUEUE, &[TRIP_EVENT_NO_DRIVERS_FOUND]),
    (NOTIFY_DRIVER_ASSIGN_QUEUE, &[TRIP_EVENT_DRIVER_ASSIGNED]),
];

/// Queues bridged to a driver's session.
pub const DRIVER_SESSION_QUEUES: &[&str] = &[DRIVER_CMD_TRIP_REQUEST_QUEUE];

/// Queues bridged to a rider's session.
pub const RIDER_SESSION_QUEUES: &[&str] =
    &[NOTIFY_NO_DRIVERS_FOUND_QUEUE, NOTIFY_DRIVER_ASSIGN_QUEUE];
