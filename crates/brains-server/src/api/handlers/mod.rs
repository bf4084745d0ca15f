//! Per-resource handler groups, one module per §6.2 surface area.

pub mod brains;
pub mod runs;
pub mod schedules;
pub mod webhooks;
