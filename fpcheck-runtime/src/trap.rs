// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Escalation from passive counting to an immediate process abort (or a
//! debugging hang), gated by environment configuration. The decision
//! (`should_trap`) is separated from the mechanism (`execute`): the
//! termination primitive differs by target, the policy does not.

use crate::event::{EventKind, EventSet};
use fpcheck_common::config::parse_env;
use nix::sys::signal::{self, Signal};
use std::io::{self, Write};
use std::time::Duration;

/// What a trap does to the process. `Hang` sleeps forever so an operator
/// can attach a debugger to the still-running process; an external watchdog
/// is expected to terminate it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrapAction {
    Abort,
    Hang,
}

fn trap_var(kind: EventKind) -> &'static str {
    match kind {
        EventKind::InfinityPos => "FPC_TRAP_INFINITY_POS",
        EventKind::InfinityNeg => "FPC_TRAP_INFINITY_NEG",
        EventKind::Nan => "FPC_TRAP_NAN",
        EventKind::DivisionZero => "FPC_TRAP_DIVISION_ZERO",
        EventKind::Cancellation => "FPC_TRAP_CANCELLATION",
        EventKind::Comparison => "FPC_TRAP_COMPARISON",
        EventKind::Underflow => "FPC_TRAP_UNDERFLOW",
        EventKind::LatentInfinityPos => "FPC_TRAP_LATENT_INF_POS",
        EventKind::LatentInfinityNeg => "FPC_TRAP_LATENT_INF_NEG",
        EventKind::LatentUnderflow => "FPC_TRAP_LATENT_UNDERFLOW",
    }
}

/// Immutable snapshot of the trap configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapConfig {
    enabled: EventSet,
    file_suffix: Option<String>,
    line: Option<u64>,
    print_hostname: bool,
    action: TrapAction,
}

impl Default for TrapConfig {
    /// Nothing enabled: every event is silently counted.
    fn default() -> TrapConfig {
        TrapConfig {
            enabled: EventSet::EMPTY,
            file_suffix: None,
            line: None,
            print_hostname: false,
            action: TrapAction::Abort,
        }
    }
}

impl TrapConfig {
    /// Reads the `FPC_*` variables from the process environment. Flag-style
    /// variables are enabled by being set to any non-empty value.
    pub fn from_env() -> TrapConfig {
        Self::from_lookup(parse_env::str_not_empty)
    }

    /// Environment-shaped constructor taking an explicit lookup so tests can
    /// drive the parser without mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TrapConfig {
        let mut enabled = EventSet::EMPTY;
        for kind in EventKind::ALL {
            if lookup(trap_var(kind)).is_some() {
                enabled.insert(kind);
            }
        }

        let file_suffix = lookup("FPC_TRAP_FILE");

        // A malformed line filter is disabled rather than silently matching
        // line 0.
        let line = lookup("FPC_TRAP_LINE").and_then(|raw| match raw.parse::<u64>() {
            Ok(line) => Some(line),
            Err(_) => {
                tracing::warn!("ignoring non-numeric FPC_TRAP_LINE value {raw:?}");
                None
            }
        });

        let action = if lookup("FPC_TRAPS_HANG").is_some() {
            TrapAction::Hang
        } else {
            TrapAction::Abort
        };

        TrapConfig {
            enabled,
            file_suffix,
            line,
            print_hostname: lookup("FPC_PRINT_HOSTNAME").is_some(),
            action,
        }
    }

    /// Decides whether the just-observed flags escalate to a trap: filters
    /// first, then the first trap-enabled kind present in `flags`, scanning
    /// kinds in declaration order.
    pub fn should_trap(
        &self,
        file: &str,
        line: u64,
        flags: EventSet,
    ) -> Option<(EventKind, TrapAction)> {
        if let Some(suffix) = &self.file_suffix {
            if !file.ends_with(suffix.as_str()) {
                return None;
            }
        }
        if let Some(wanted) = self.line {
            if line != wanted {
                return None;
            }
        }
        let kind = EventKind::ALL
            .into_iter()
            .find(|k| flags.contains(*k) && self.enabled.contains(*k))?;
        Some((kind, self.action))
    }

    /// Prints the trap diagnostic and stops the process. Never returns:
    /// `Abort` raises SIGABRT, `Hang` sleeps until an operator or watchdog
    /// intervenes.
    ///
    /// Writes go straight to stdout and are flushed before the signal is
    /// raised, so the diagnostic survives the abort. Write failures are
    /// ignored: the process is stopping either way.
    pub fn execute(&self, kind: EventKind, file: &str, line: u64) -> ! {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "#FPCHECKER: Interrupting execution...");
        let _ = writeln!(out, "#FPCHECKER: {}", kind.display_name());
        let _ = writeln!(out, "#FPCHECKER: {file}:{line}");
        if self.print_hostname {
            let _ = writeln!(
                out,
                "HOST: {}, PID: {}",
                fpcheck_common::hostname(),
                std::process::id()
            );
        }
        let _ = out.flush();
        drop(out);

        match self.action {
            TrapAction::Abort => {
                let _ = signal::raise(Signal::SIGABRT);
                // Reached only if the host catches or ignores SIGABRT.
                std::process::abort();
            }
            TrapAction::Hang => loop {
                std::thread::sleep(Duration::from_secs(3600));
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_nothing_enabled_by_default() {
        let config = TrapConfig::from_lookup(|_| None);
        assert_eq!(config, TrapConfig::default());
        let flags = EventSet::EMPTY.with(EventKind::Nan);
        assert_eq!(config.should_trap("a.c", 42, flags), None);
    }

    #[test]
    fn test_enabled_kind_traps() {
        let config = TrapConfig::from_lookup(lookup_from(&[("FPC_TRAP_NAN", "1")]));
        let flags = EventSet::EMPTY.with(EventKind::Nan);
        assert_eq!(
            config.should_trap("a.c", 42, flags),
            Some((EventKind::Nan, TrapAction::Abort))
        );
        // The flag has to actually be present in the observation.
        let other = EventSet::EMPTY.with(EventKind::Underflow);
        assert_eq!(config.should_trap("a.c", 42, other), None);
    }

    #[test]
    fn test_first_enabled_kind_wins() {
        let config = TrapConfig::from_lookup(lookup_from(&[
            ("FPC_TRAP_NAN", "1"),
            ("FPC_TRAP_DIVISION_ZERO", "1"),
        ]));
        let flags = EventSet::EMPTY
            .with(EventKind::Nan)
            .with(EventKind::DivisionZero);
        // Nan precedes DivisionZero in declaration order.
        assert_eq!(
            config.should_trap("a.c", 42, flags),
            Some((EventKind::Nan, TrapAction::Abort))
        );
    }

    #[test]
    fn test_file_suffix_filter() {
        let config = TrapConfig::from_lookup(lookup_from(&[
            ("FPC_TRAP_NAN", "1"),
            ("FPC_TRAP_FILE", "solver.c"),
        ]));
        let flags = EventSet::EMPTY.with(EventKind::Nan);
        assert!(config.should_trap("src/solver.c", 1, flags).is_some());
        assert!(config.should_trap("src/other.c", 1, flags).is_none());
    }

    #[test]
    fn test_line_filter() {
        let config = TrapConfig::from_lookup(lookup_from(&[
            ("FPC_TRAP_NAN", "1"),
            ("FPC_TRAP_LINE", "42"),
        ]));
        let flags = EventSet::EMPTY.with(EventKind::Nan);
        assert!(config.should_trap("a.c", 42, flags).is_some());
        assert!(config.should_trap("a.c", 41, flags).is_none());
    }

    #[test]
    fn test_malformed_line_filter_is_disabled() {
        let config = TrapConfig::from_lookup(lookup_from(&[
            ("FPC_TRAP_NAN", "1"),
            ("FPC_TRAP_LINE", "fortytwo"),
        ]));
        let flags = EventSet::EMPTY.with(EventKind::Nan);
        // The filter is dropped entirely, not parsed to line 0.
        assert!(config.should_trap("a.c", 0, flags).is_some());
        assert!(config.should_trap("a.c", 7, flags).is_some());
    }

    #[test]
    fn test_hang_action_selected() {
        let config = TrapConfig::from_lookup(lookup_from(&[
            ("FPC_TRAP_UNDERFLOW", "1"),
            ("FPC_TRAPS_HANG", "1"),
        ]));
        let flags = EventSet::EMPTY.with(EventKind::Underflow);
        assert_eq!(
            config.should_trap("a.c", 1, flags),
            Some((EventKind::Underflow, TrapAction::Hang))
        );
    }

    #[test]
    fn test_every_kind_has_a_variable() {
        let pairs: Vec<(&str, &str)> = EventKind::ALL.map(|k| (trap_var(k), "1")).to_vec();
        let config = TrapConfig::from_lookup(lookup_from(&pairs));
        for kind in EventKind::ALL {
            let flags = EventSet::EMPTY.with(kind);
            assert_eq!(
                config.should_trap("a.c", 1, flags),
                Some((kind, TrapAction::Abort)),
                "kind {kind:?} should trap"
            );
        }
    }
}
