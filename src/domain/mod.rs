// Domain layer: entities and the ports the engine consumes.

pub mod model;
pub mod ports;
