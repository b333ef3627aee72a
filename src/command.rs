// =============================================================================
// Command — UI -> CommandQueue
// =============================================================================
//
// Commands are idempotent and carry a monotonically assigned id; only the
// last-seen value per variant within a cycle boundary takes effect (see
// `CommandQueue::drain_coalesced`).
// =============================================================================

use serde::Deserialize;

use crate::types::Intent;

/// A single command observed from the UI/command producer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum CommandKind {
    SetIntent(Intent),
    SetArm(bool),
}

/// A command plus its assigned id and wall-clock timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    pub id: u64,
    pub ts_unix_ms: u64,
    pub kind: CommandKind,
}

/// The result of coalescing a batch of commands drained at a cycle
/// boundary: at most one `SetIntent` and one `SetArm`, each the
/// last-seen value, plus the id/timestamp of whichever command (of either
/// kind) had the highest id.
#[derive(Debug, Clone, Default)]
pub struct CoalescedCommands {
    pub intent: Option<Intent>,
    pub arm: Option<bool>,
    pub last_cmd_id: Option<u64>,
    pub last_cmd_ts_unix_ms: Option<u64>,
}

/// Coalesce a batch of commands in arrival order: last-write-wins per
/// variant, `last_cmd_id`/`last_cmd_ts_unix_ms` reflect the maximum id seen
/// across both variants.
pub fn coalesce(commands: &[Command]) -> CoalescedCommands {
    let mut out = CoalescedCommands::default();
    for cmd in commands {
        match cmd.kind {
            CommandKind::SetIntent(intent) => out.intent = Some(intent),
            CommandKind::SetArm(arm) => out.arm = Some(arm),
        }
        if out.last_cmd_id.map_or(true, |max| cmd.id > max) {
            out.last_cmd_id = Some(cmd.id);
            out.last_cmd_ts_unix_ms = Some(cmd.ts_unix_ms);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_keeps_last_value_per_variant() {
        let cmds = vec![
            Command {
                id: 1,
                ts_unix_ms: 100,
                kind: CommandKind::SetIntent(Intent::Long),
            },
            Command {
                id: 2,
                ts_unix_ms: 200,
                kind: CommandKind::SetArm(true),
            },
            Command {
                id: 3,
                ts_unix_ms: 300,
                kind: CommandKind::SetIntent(Intent::Flat),
            },
        ];
        let result = coalesce(&cmds);
        assert_eq!(result.intent, Some(Intent::Flat));
        assert_eq!(result.arm, Some(true));
        assert_eq!(result.last_cmd_id, Some(3));
        assert_eq!(result.last_cmd_ts_unix_ms, Some(300));
    }

    #[test]
    fn coalesce_empty_batch_yields_no_changes() {
        let result = coalesce(&[]);
        assert_eq!(result.intent, None);
        assert_eq!(result.arm, None);
        assert_eq!(result.last_cmd_id, None);
    }

    #[test]
    fn coalesce_out_of_order_ids_still_picks_max() {
        // Arrival order is FIFO but ids are still assigned monotonically by
        // the producer; last_cmd_id tracks the max id observed, not simply
        // the last element.
        let cmds = vec![
            Command {
                id: 5,
                ts_unix_ms: 500,
                kind: CommandKind::SetArm(true),
            },
            Command {
                id: 4,
                ts_unix_ms: 400,
                kind: CommandKind::SetIntent(Intent::Short),
            },
        ];
        let result = coalesce(&cmds);
        assert_eq!(result.last_cmd_id, Some(5));
        assert_eq!(result.intent, Some(Intent::Short));
    }
}
