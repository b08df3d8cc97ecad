//! Payload and role types

pub mod payload;
pub mod role;

pub use payload::{ArrivalTime, FrameData, FrameId, StaticData, SubjectFrameData};
pub use role::{BasicRole, Role, RoleSchema};
