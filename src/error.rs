use std::io;

use thiserror::Error;

/// Failures reported by a VM binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("ROM of {requested} bytes does not fit, capacity is {capacity} bytes")]
    Allocation { requested: usize, capacity: usize },

    #[error("ROM handle does not match the current allocation")]
    RomHandleMismatch,

    #[error("ROM copy of {actual} bytes does not fill the {expected} byte allocation")]
    RomLength { expected: usize, actual: usize },

    #[error("no fully copied ROM is staged for loading")]
    NoRomStaged,

    #[error("video handle from generation {held} used after generation {current}")]
    StaleBuffer { held: u64, current: u64 },

    #[error("program counter {pc:#06x} is outside memory")]
    ProgramCounter { pc: u16 },

    #[error("VM worker thread is gone")]
    WorkerGone,
}

/// Errors surfaced by the host session.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("ROM of {requested} bytes does not fit, capacity is {capacity} bytes")]
    Allocation { requested: usize, capacity: usize },

    #[error("tick {tick} faulted: {source}")]
    TickFault {
        tick: u64,
        #[source]
        source: VmError,
    },

    #[error(transparent)]
    Vm(VmError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<VmError> for HostError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Allocation {
                requested,
                capacity,
            } => HostError::Allocation {
                requested,
                capacity,
            },
            other => HostError::Vm(other),
        }
    }
}

/// Errors reading the ROM catalog or a ROM image.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("can't read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key mapping sends {symbol:?} to {value}, keypad ids are 0-15")]
    KeyOutOfRange { symbol: String, value: u8 },

    #[error("no ROM titled {0:?} in catalog")]
    UnknownTitle(String),

    #[error("catalog is empty")]
    Empty,
}
