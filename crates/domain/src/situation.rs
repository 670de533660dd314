//! DUE situation partition.
//!
//! Situation strings partition declarations into three disjoint sets that
//! drive the refresh policy: cancelled DUEs are terminal and never touched
//! again, pending DUEs always refresh, settled (averbada) DUEs refresh only
//! when a revision probe says the upstream changed. The sets ship with the
//! known upstream vocabulary but can be overridden through configuration.

use std::collections::HashSet;

/// Refresh class of one DUE situation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SituationClass {
    /// Terminal; never refreshed.
    Cancelled,
    /// Averbada or desembaraçada with averbação; refreshed only on revision change.
    Settled,
    /// In-flight workflow; always refreshed.
    Pending,
}

const CANCELLED: &[&str] = &[
    "CANCELADA_POR_EXPIRACAO_DE_PRAZO",
    "CANCELADA_PELA_ADUANA_A_PEDIDO_DO_EXPORTADOR",
    "CANCELADA_PELO_EXPORTADOR",
    "CANCELADA_PELO_SISCOMEX",
];

const SETTLED: &[&str] = &["AVERBADA_SEM_DIVERGENCIA", "AVERBADA_COM_DIVERGENCIA"];

const PENDING: &[&str] = &[
    "EM_CARGA",
    "DESEMBARACADA",
    "AGUARDANDO_AVERBACAO",
    "EM_ELABORACAO",
    "REGISTRADA",
    "PARAMETRIZADA_VERDE",
    "PARAMETRIZADA_AMARELO",
    "PARAMETRIZADA_VERMELHO",
    "INTERROMPIDA",
];

/// Configurable partition of situation strings.
#[derive(Debug, Clone)]
pub struct SituationPartition {
    cancelled: HashSet<String>,
    settled: HashSet<String>,
}

impl Default for SituationPartition {
    fn default() -> Self {
        Self {
            cancelled: CANCELLED.iter().map(|s| (*s).to_string()).collect(),
            settled: SETTLED.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl SituationPartition {
    /// Build a partition from explicit sets. Strings outside both sets are
    /// treated as pending, so only the terminal and settled vocabularies
    /// need to be enumerated.
    pub fn new<I, J>(cancelled: I, settled: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            cancelled: cancelled.into_iter().collect(),
            settled: settled.into_iter().collect(),
        }
    }

    /// The pending vocabulary known at the time of writing; informational
    /// only — classification treats every unknown string as pending.
    pub fn known_pending() -> impl Iterator<Item = &'static str> {
        PENDING.iter().copied()
    }

    pub fn classify(&self, situation: &str) -> SituationClass {
        if self.cancelled.contains(situation) {
            SituationClass::Cancelled
        } else if self.settled.contains(situation) {
            SituationClass::Settled
        } else {
            SituationClass::Pending
        }
    }

    pub fn is_cancelled(&self, situation: &str) -> bool {
        self.classify(situation) == SituationClass::Cancelled
    }

    pub fn cancelled_set(&self) -> impl Iterator<Item = &str> {
        self.cancelled.iter().map(String::as_str)
    }

    pub fn settled_set(&self) -> impl Iterator<Item = &str> {
        self.settled.iter().map(String::as_str)
    }
}
