use std::fmt;
use std::path::PathBuf;

use crate::error::FsError;

// --- LÍMITES DE DISEÑO ---
pub const MAX_FILE_BLOCKS_COUNT: usize = 256;
pub const MAX_FILE_LINKS_COUNT: u32 = 8;
pub const MAX_FILE_NAME_LENGTH: usize = 128;
pub const MAX_OPENED_FILES_COUNT: u32 = 128;

// Centinelas en disco para los índices opcionales.
// Un índice real jamás puede valer esto (está fuera de rango por construcción).
pub const NO_BLOCK: u64 = u64::MAX;
pub const NO_DESCRIPTOR: u32 = u32::MAX;

// --- ESTRUCTURAS PRINCIPALES ---

/// Cabecera del contenedor. Se guarda una sola vez en el offset 0;
/// todos los demás offsets se CALCULAN a partir de estos tres campos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub block_size: u32,
    pub blocks_count: u64,
    pub descriptors_count: u32,
}

impl Superblock {
    /// Tamaño de la cabecera en bytes: block_size + blocks_count + descriptors_count.
    pub const SIZE: usize = 4 + 8 + 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.block_size.to_le_bytes());
        buf[4..12].copy_from_slice(&self.blocks_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.descriptors_count.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            block_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            blocks_count: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            descriptors_count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }

    /// Cantidad total de entradas en la tabla de enlaces.
    /// Es fija por formato: descriptors_count * MAX_FILE_LINKS_COUNT.
    pub fn total_links(&self) -> u32 {
        self.descriptors_count * MAX_FILE_LINKS_COUNT
    }
}

/// Registro de archivo (el equivalente a un inodo).
///
/// Invariante: links_count == 0 implica file_size == 0 y blocks todo vacío.
/// Invariante: las entradas ocupadas de blocks son contiguas desde el índice 0
/// (no hay archivos dispersos).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub links_count: u32,
    pub file_size: u64,
    pub blocks: [Option<u64>; MAX_FILE_BLOCKS_COUNT],
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            links_count: 0,
            file_size: 0,
            blocks: [None; MAX_FILE_BLOCKS_COUNT],
        }
    }
}

impl Descriptor {
    /// Tamaño del registro en disco: links_count + file_size + 256 índices de bloque.
    pub const SIZE: usize = 4 + 8 + MAX_FILE_BLOCKS_COUNT * 8;

    /// Cantidad de bloques ocupados: entradas contiguas desde el inicio.
    pub fn used_blocks_count(&self) -> usize {
        self.blocks.iter().take_while(|b| b.is_some()).count()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.links_count.to_le_bytes());
        buf.extend_from_slice(&self.file_size.to_le_bytes());
        for block in &self.blocks {
            buf.extend_from_slice(&block.unwrap_or(NO_BLOCK).to_le_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FsError> {
        if buf.len() != Self::SIZE {
            return Err(FsError::CorruptStructure(
                "registro de descriptor con tamaño inesperado",
            ));
        }
        let mut descriptor = Self {
            links_count: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            file_size: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            blocks: [None; MAX_FILE_BLOCKS_COUNT],
        };
        for (i, entry) in descriptor.blocks.iter_mut().enumerate() {
            let offset = 12 + i * 8;
            let raw = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
            // Validamos el centinela al decodificar
            *entry = if raw == NO_BLOCK { None } else { Some(raw) };
        }
        Ok(descriptor)
    }
}

/// Entrada de directorio: par (nombre, índice de descriptor).
/// El espacio de nombres es plano; varios enlaces pueden apuntar
/// al mismo descriptor (hard links).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub descriptor_index: Option<u32>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            name: String::new(),
            descriptor_index: None,
        }
    }
}

impl Link {
    /// Tamaño de la entrada en disco: nombre con relleno fijo + índice de descriptor.
    pub const SIZE: usize = MAX_FILE_NAME_LENGTH + 4;

    pub fn new(name: &str, descriptor_index: u32) -> Self {
        Self {
            name: name.to_string(),
            descriptor_index: Some(descriptor_index),
        }
    }

    /// Una entrada está en uso solo si apunta a un descriptor.
    pub fn is_used(&self) -> bool {
        self.descriptor_index.is_some()
    }

    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.name.len() <= MAX_FILE_NAME_LENGTH);
        let mut buf = vec![0u8; Self::SIZE];
        let name_bytes = self.name.as_bytes();
        buf[..name_bytes.len()].copy_from_slice(name_bytes);
        buf[MAX_FILE_NAME_LENGTH..]
            .copy_from_slice(&self.descriptor_index.unwrap_or(NO_DESCRIPTOR).to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FsError> {
        if buf.len() != Self::SIZE {
            return Err(FsError::CorruptStructure(
                "entrada de enlace con tamaño inesperado",
            ));
        }
        let name_bytes = &buf[..MAX_FILE_NAME_LENGTH];
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(MAX_FILE_NAME_LENGTH);
        let name = std::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| FsError::CorruptStructure("nombre de enlace con UTF-8 inválido"))?
            .to_string();

        let raw = u32::from_le_bytes(buf[MAX_FILE_NAME_LENGTH..].try_into().unwrap());
        let descriptor_index = if raw == NO_DESCRIPTOR { None } else { Some(raw) };

        Ok(Self { name, descriptor_index })
    }
}

/// Resumen agregado del sistema de archivos.
///
/// No es estado autoritativo: se recalcula escaneando el contenedor
/// después de cada mutación y sirve para reportes y pre-condiciones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsInfo {
    pub container_path: PathBuf,
    pub block_size: u32,
    pub blocks_count: u64,
    pub used_blocks_count: u64,
    pub free_blocks_count: u64,
    pub descriptors_count: u32,
    pub used_descriptors_count: u32,
    pub free_descriptors_count: u32,
    pub links_count: u32,
    pub used_links_count: u32,
    pub available_links_count: u32,
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sistema de archivos '{}':", self.container_path.display())?;
        writeln!(f, "\tTamaño de bloque   - {}B", self.block_size)?;
        writeln!(f)?;
        writeln!(f, "\tBloques totales    - {}", self.blocks_count)?;
        writeln!(f, "\tBloques usados     - {}", self.used_blocks_count)?;
        writeln!(f, "\tBloques libres     - {}", self.free_blocks_count)?;
        writeln!(f)?;
        writeln!(f, "\tDescriptores       - {}", self.descriptors_count)?;
        writeln!(f, "\tDescr. usados      - {}", self.used_descriptors_count)?;
        writeln!(f, "\tDescr. libres      - {}", self.free_descriptors_count)?;
        writeln!(f)?;
        writeln!(f, "\tEnlaces totales    - {}", self.links_count)?;
        writeln!(f, "\tEnlaces usados     - {}", self.used_links_count)?;
        write!(f, "\tEnlaces libres     - {}", self.available_links_count)
    }
}
