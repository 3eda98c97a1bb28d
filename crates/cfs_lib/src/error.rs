use thiserror::Error;

use crate::state::StateError;

/// Taxonomía completa de errores del núcleo.
///
/// Todos se devuelven como valores tipados; el núcleo nunca imprime
/// ni reintenta. `CorruptStructure` señala un invariante roto dentro
/// del contenedor (un bug previo, no un error del usuario).
#[derive(Error, Debug)]
pub enum FsError {
    #[error("No hay sistema de archivos montado")]
    NotMounted,

    #[error("Nombre de archivo ilegal")]
    IllegalName,

    #[error("El nombre excede el límite de {limit} bytes")]
    NameTooLong { limit: usize },

    #[error("Ya existe un archivo o enlace con ese nombre")]
    NameConflict,

    #[error("No existe un archivo con ese nombre")]
    NoSuchFile,

    #[error("No quedan descriptores libres")]
    DescriptorTableFull,

    #[error("No quedan entradas libres en la tabla de enlaces")]
    LinkTableFull,

    #[error("El archivo ya alcanzó el límite de enlaces")]
    LinkLimitExceeded,

    #[error("No se pueden abrir más archivos")]
    OpenTableFull,

    #[error("No hay un archivo abierto con el descriptor {0}")]
    InvalidDescriptor(u32),

    #[error("Lectura fuera de los límites del archivo")]
    OutOfFileBounds,

    #[error("Escritura más allá del tamaño asignado; use truncate primero")]
    WriteBeyondAllocatedSize,

    #[error("No hay espacio suficiente")]
    InsufficientSpace,

    #[error("Estructura del sistema de archivos corrupta: {0}")]
    CorruptStructure(&'static str),

    #[error("Error de IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error del estado persistido: {0}")]
    State(#[from] StateError),
}
