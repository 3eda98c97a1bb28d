use std::collections::BTreeMap;

use crate::error::FsError;
use crate::types::MAX_OPENED_FILES_COUNT;

/// Tabla de archivos abiertos: fd -> índice de descriptor.
///
/// Varios fds pueden apuntar al mismo descriptor, pero reabrir un archivo
/// ya abierto devuelve el MISMO fd en lugar de crear otro. La tabla vive
/// en memoria y el facade la persiste completa tras cada cambio.
#[derive(Debug, Clone, Default)]
pub struct OpenFileTable {
    entries: BTreeMap<u32, u32>,
}

impl OpenFileTable {
    pub fn from_map(entries: BTreeMap<u32, u32>) -> Self {
        Self { entries }
    }

    pub fn as_map(&self) -> &BTreeMap<u32, u32> {
        &self.entries
    }

    pub fn descriptor_for(&self, fd: u32) -> Option<u32> {
        self.entries.get(&fd).copied()
    }

    pub fn is_descriptor_open(&self, descriptor_index: u32) -> bool {
        self.entries.values().any(|&d| d == descriptor_index)
    }

    /// Registra una apertura y devuelve el fd asignado.
    ///
    /// Si el descriptor ya está abierto, devuelve el fd existente; si no,
    /// el menor fd libre en [0, MAX_OPENED_FILES_COUNT).
    pub fn open(&mut self, descriptor_index: u32) -> Result<u32, FsError> {
        if let Some((&fd, _)) = self.entries.iter().find(|&(_, &d)| d == descriptor_index) {
            return Ok(fd);
        }

        for fd in 0..MAX_OPENED_FILES_COUNT {
            if !self.entries.contains_key(&fd) {
                self.entries.insert(fd, descriptor_index);
                return Ok(fd);
            }
        }
        Err(FsError::OpenTableFull)
    }

    /// Cierra exactamente el fd indicado.
    pub fn close(&mut self, fd: u32) -> Result<(), FsError> {
        self.entries
            .remove(&fd)
            .map(|_| ())
            .ok_or(FsError::InvalidDescriptor(fd))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
