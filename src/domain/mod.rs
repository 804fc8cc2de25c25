//! Domain layer: rent invoices, properties, policy decisions, settlements,
//! engine events, and the ports the engine talks to.

pub mod decision;
pub mod events;
pub mod invoice;
pub mod ports;
pub mod property;
pub mod settlement;
