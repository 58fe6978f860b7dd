//! Plan lifecycle notifications
//!
//! Observers are registered on the coordinator and receive a [`PlanEvent`] for
//! every change to the live-plan map.

use crate::error::Result;
use crate::types::{PlanId, SynchronizedBehaviorPlan};
use std::sync::Arc;

/// Change to the set of live plans
#[derive(Debug, Clone)]
pub enum PlanEvent {
    /// A new plan started playing
    Created(Arc<SynchronizedBehaviorPlan>),
    /// A live plan was replaced by an adapted version
    Adapted {
        plan: Arc<SynchronizedBehaviorPlan>,
        previous_version: u32,
    },
    /// A plan finished and was evicted on time advance
    Evicted { id: PlanId, at_ms: f64 },
    /// A plan was discarded before finishing
    Discarded { id: PlanId },
}

impl PlanEvent {
    pub fn plan_id(&self) -> PlanId {
        match self {
            PlanEvent::Created(plan) => plan.id,
            PlanEvent::Adapted { plan, .. } => plan.id,
            PlanEvent::Evicted { id, .. } | PlanEvent::Discarded { id } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlanEvent::Created(_) => "created",
            PlanEvent::Adapted { .. } => "adapted",
            PlanEvent::Evicted { .. } => "evicted",
            PlanEvent::Discarded { .. } => "discarded",
        }
    }
}

/// Receiver of plan lifecycle events.
///
/// Delivery is synchronous and in registration order. An error returned by one
/// observer is logged at `warn` level and does not stop delivery to the others
/// or fail the operation that produced the event.
pub trait PlanObserver: Send + Sync {
    fn on_plan_event(&self, event: &PlanEvent) -> Result<()>;
}
