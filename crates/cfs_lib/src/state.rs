use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Error de IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error de codificación: {0}")]
    Codec(#[from] bincode::Error),
}

/// Estado compartido entre invocaciones independientes del proceso:
/// la ruta del contenedor montado y la tabla de archivos abiertos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub container_path: Option<PathBuf>,
    pub open_files: BTreeMap<u32, u32>, // fd -> índice de descriptor
}

/// Contrato mínimo del almacén externo: cargar y guardar el estado completo.
/// No hay actualizaciones parciales.
pub trait StateStore {
    fn load(&self) -> Result<PersistedState, StateError>;
    fn save(&self, state: &PersistedState) -> Result<(), StateError>;
}

/// Almacén sobre un archivo pequeño serializado con bincode.
/// Si el archivo no existe todavía, se parte de un estado vacío.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<PersistedState, StateError> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let bytes = fs::read(&self.path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let bytes = bincode::serialize(state)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

/// Almacén en memoria para pruebas. Los clones comparten el mismo estado,
/// igual que dos invocaciones del proceso comparten el archivo de estado.
#[derive(Clone, Default)]
pub struct MemStateStore {
    state: Rc<RefCell<PersistedState>>,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemStateStore {
    fn load(&self) -> Result<PersistedState, StateError> {
        Ok(self.state.borrow().clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        *self.state.borrow_mut() = state.clone();
        Ok(())
    }
}
