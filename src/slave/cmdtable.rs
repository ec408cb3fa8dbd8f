//! Function-code dispatch table for the slave pipeline.

use serde::{Deserialize, Serialize};

use crate::errors::SlaveError;
use crate::frame::MAX_FUNCTION_CODE;
use crate::slave::cmdlet::Handler;

/// Storage layout of the command table, chosen at construction.
///
/// Dense trades memory (one slot per possible function code) for O(1)
/// lookup; compact keeps only registered entries and scans linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTableLayout {
    Dense,
    Compact { capacity: usize },
}

/// One registered command.
pub struct Entry {
    pub function: u8,
    pub handler: Handler,
    /// The command is silently dropped for broadcast requests.
    pub no_broadcast: bool,
    /// The command is silently dropped while listen-only mode is active.
    pub no_listen_only: bool,
}

enum Storage {
    Dense(Vec<Option<Entry>>),
    Compact { entries: Vec<Entry>, capacity: usize },
}

/// Bounded collection of command entries keyed by function code.
///
/// Read-only after configuration: entries are added during initialization
/// and never removed.
pub struct CommandTable {
    storage: Storage,
    count: usize,
}

impl CommandTable {
    pub fn new(layout: CommandTableLayout) -> Self {
        let storage = match layout {
            CommandTableLayout::Dense => {
                let mut slots = Vec::with_capacity(MAX_FUNCTION_CODE as usize);
                slots.resize_with(MAX_FUNCTION_CODE as usize, || None);
                Storage::Dense(slots)
            }
            CommandTableLayout::Compact { capacity } => Storage::Compact {
                entries: Vec::with_capacity(capacity.min(255)),
                capacity: capacity.min(255),
            },
        };
        Self { storage, count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Registers a handler for a function code.
    pub fn add(
        &mut self,
        function: u8,
        handler: Handler,
        no_broadcast: bool,
        no_listen_only: bool,
    ) -> Result<(), SlaveError> {
        if function == 0 || function > MAX_FUNCTION_CODE {
            return Err(SlaveError::FunctionCodeInvalid(function));
        }
        let entry = Entry {
            function,
            handler,
            no_broadcast,
            no_listen_only,
        };
        match &mut self.storage {
            Storage::Dense(slots) => {
                let slot = &mut slots[(function - 1) as usize];
                if slot.is_some() {
                    return Err(SlaveError::FunctionCodeExisted(function));
                }
                *slot = Some(entry);
            }
            Storage::Compact { entries, capacity } => {
                if entries.iter().any(|e| e.function == function) {
                    return Err(SlaveError::FunctionCodeExisted(function));
                }
                if entries.len() >= *capacity {
                    return Err(SlaveError::NoFreeTableItem);
                }
                entries.push(entry);
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Looks up the entry for a function code.
    pub fn lookup_mut(&mut self, function: u8) -> Option<&mut Entry> {
        if function == 0 || function > MAX_FUNCTION_CODE {
            return None;
        }
        match &mut self.storage {
            Storage::Dense(slots) => slots[(function - 1) as usize].as_mut(),
            Storage::Compact { entries, .. } => {
                entries.iter_mut().find(|e| e.function == function)
            }
        }
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
