//! Contradiction table

use crate::types::BehaviorType;

/// Pairs of behaviors that visually contradict each other
pub const CONTRADICTORY_PAIRS: [(BehaviorType, BehaviorType); 7] = [
    (BehaviorType::Smile, BehaviorType::Concern),
    (BehaviorType::Smile, BehaviorType::Frown),
    (BehaviorType::Celebratory, BehaviorType::Questioning),
    (BehaviorType::Celebratory, BehaviorType::Concern),
    (BehaviorType::ThumbsUp, BehaviorType::Frown),
    (BehaviorType::Nod, BehaviorType::Shake),
    (BehaviorType::Surprise, BehaviorType::Thinking),
];

/// Whether two behaviors contradict each other (symmetric)
pub fn is_contradictory(a: BehaviorType, b: BehaviorType) -> bool {
    CONTRADICTORY_PAIRS
        .iter()
        .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
}
