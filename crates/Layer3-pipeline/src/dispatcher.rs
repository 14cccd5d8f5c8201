//! Plan Dispatcher - 검증 후 `plan.dispatched` 발행
//!
//! 실행은 외부 runner의 몫이다. 구독자가 없으면 plan은 그대로 버려진다
//! (at-most-once, 버퍼링 없음). 전달이 필요하면 dispatch 전에 구독해야 한다.

use conductor_foundation::{topics, ActionPlan, EventBus, EventPayload, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// `plan.dispatched` 전달 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 구독자 없음 (plan은 버려졌다)
    Dropped,
    /// 구독자는 있었지만 전부 실패
    Failed { listeners: usize },
    Delivered { delivered: usize, listeners: usize },
}

impl Delivery {
    fn classify(listeners: usize, delivered: usize) -> Self {
        match (listeners, delivered) {
            (0, 0) => Self::Dropped,
            (listeners, 0) => Self::Failed { listeners },
            (listeners, delivered) => Self::Delivered {
                delivered,
                listeners: listeners.max(delivered),
            },
        }
    }
}

pub struct PlanDispatcher {
    bus: Arc<EventBus>,
}

impl PlanDispatcher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// plan 발행. 실행 완료를 기다리지 않는다.
    pub async fn dispatch(&self, plan: ActionPlan) -> Result<()> {
        self.dispatch_tracked(plan).await.map(|_| ())
    }

    /// `dispatch`와 같지만 전달 결과를 돌려준다
    pub async fn dispatch_tracked(&self, plan: ActionPlan) -> Result<Delivery> {
        plan.validate()?;

        let actions = plan.actions.len();
        let project_root = plan.project_root.clone();

        let listeners = self.bus.listener_count(topics::PLAN_DISPATCHED).await;
        let delivered = self
            .bus
            .publish(
                topics::PLAN_DISPATCHED,
                EventPayload::PlanDispatched(Arc::new(plan)),
            )
            .await;

        let delivery = Delivery::classify(listeners, delivered);
        match delivery {
            Delivery::Dropped => warn!(
                project_root = %project_root,
                actions,
                "Plan dispatched with no listener; it was dropped"
            ),
            Delivery::Failed { listeners } => warn!(
                project_root = %project_root,
                actions,
                listeners,
                "Plan dispatched but every listener failed"
            ),
            Delivery::Delivered { delivered, .. } => {
                info!(project_root = %project_root, actions, delivered, "Plan dispatched")
            }
        }

        Ok(delivery)
    }
}
