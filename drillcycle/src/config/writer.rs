//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let selection_seed = optional(config.selection.seed);
    let fuel_seed = optional(config.fuel.seed);
    let secret = config.admin.secret.as_deref().unwrap_or("");

    format!(
        r#"[cycle]
; Cycle length in seconds; one cycle boundary is processed per interval (default: 600)
duration_secs = {}
; Recalibrate the active-session counter every N cycles, 0 disables (default: 10)
recalibrate_every = {}
; Warn when a finalization pass runs longer than this many seconds (default: 120)
finalize_timeout_secs = {}

[issuance]
; Issuance of cycle 1. Halves every epoch, never below 1 (default: 1000)
genesis = {}
; Number of cycles per halving epoch (default: 10000)
epoch_length = {}

[selection]
; Bounds of the uniform luck factor applied to each drill's efficiency
min_luck = {}
max_luck = {}
; Fixed seed for reproducible extractor draws (empty = random)
seed = {}

[fuel]
; Fuel burned per cycle by operators with a running session
depletion_min = {}
depletion_max = {}
; Fuel regained per cycle by idle operators below capacity
regen_min = {}
regen_max = {}
; Running sessions at or below this fuel level are closed (default: 0)
depletion_threshold = {}
; Fuel required to start a session (default: 10)
min_operating_fuel = {}
; Fixed seed for reproducible fuel draws (empty = random)
seed = {}

[rewards]
; Solo split: fraction of issuance paid to the extractor (default: 0.5)
solo_extractor = {}
; Solo split: fraction shared by active operators by efficiency (default: 0.4)
; The remainder goes to the reserve. Pools carry their own split.
solo_active_members = {}

[index]
; Full reconciliation interval when the drill change feed is unavailable (default: 300)
reconcile_interval_secs = {}

[admin]
; Shared secret for toggling scheduling and resetting the cycle counter
; Admin operations are refused while empty
secret = {}

[logging]
; Log directory (default: ~/.drillcycle/logs)
directory = {}
; Log file name (default: drillcycle.log)
file = {}
"#,
        config.cycle.duration_secs,
        config.cycle.recalibrate_every,
        config.cycle.finalize_timeout_secs,
        config.issuance.genesis,
        config.issuance.epoch_length,
        config.selection.min_luck,
        config.selection.max_luck,
        selection_seed,
        config.fuel.depletion_min,
        config.fuel.depletion_max,
        config.fuel.regen_min,
        config.fuel.regen_max,
        config.fuel.depletion_threshold,
        config.fuel.min_operating_fuel,
        fuel_seed,
        config.rewards.solo_extractor,
        config.rewards.solo_active_members,
        config.index.reconcile_interval_secs,
        secret,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
