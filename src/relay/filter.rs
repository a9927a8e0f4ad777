//! 通知原因过滤

use crate::config::ReasonSet;
use tracing::debug;

/// 通知原因是否在允许集合中（精确匹配，区分大小写）
pub fn allowed(reason: &str, set: &ReasonSet) -> bool {
    let allowed = set.contains(reason);
    if !allowed {
        debug!(reason, "Notification reason not configured, ignoring");
    }
    allowed
}
