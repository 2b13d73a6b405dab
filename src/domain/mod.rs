// Domain layer: models and the ports of the external collaborators.

pub mod model;
pub mod ports;
