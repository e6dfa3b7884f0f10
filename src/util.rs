//! Small threading utilities shared by the service components.

pub mod timer;
