//! Núcleo de cfs: un sistema de archivos de juguete dentro de un único
//! archivo "contenedor" con layout fijo (cabecera, bitmap de bloques,
//! tabla de descriptores, tabla de enlaces y región de datos).
//!
//! El núcleo no imprime ni parsea argumentos: expone un facade
//! ([`fs::FileSystem`]) que devuelve resultados y errores tipados.
//! El estado entre invocaciones (ruta montada + archivos abiertos) viaja
//! por un almacén externo inyectado ([`state::StateStore`]).

pub mod bitmap;
pub mod device;
pub mod error;
pub mod fs;
pub mod layout;
pub mod open_files;
pub mod state;
pub mod types;

pub use error::FsError;
pub use fs::{FileEntry, FileStat, FileSystem, TruncateOutcome};
pub use state::{FileStateStore, MemStateStore, StateStore};
