use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::FsError;
use crate::layout::{Layout, fit_blocks_count};
use crate::types::{Descriptor, Link, MAX_FILE_LINKS_COUNT, Superblock};

/// Contenedor abierto: el archivo regular que alberga el sistema completo.
///
/// Cada accessor hace su propio seek + lectura/escritura; no hay caché ni
/// transacciones entre accesos. Las violaciones de rango en los índices se
/// reportan como `CorruptStructure` porque solo pueden venir de estructuras
/// en disco inconsistentes (el facade valida las entradas del usuario).
pub struct Container {
    file: std::fs::File,
    path: PathBuf,
    superblock: Superblock,
    layout: Layout,
}

impl Container {
    /// Abre un contenedor ya formateado y deriva los offsets de su cabecera.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FsError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut buf = [0u8; Superblock::SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let superblock = Superblock::decode(&buf);

        if superblock.block_size == 0 || superblock.descriptors_count == 0 {
            return Err(FsError::CorruptStructure("cabecera con geometría en cero"));
        }
        // Cota antes de calcular offsets: con una cabecera basura la
        // cantidad total de enlaces desbordaría u32
        if superblock.descriptors_count > u32::MAX / MAX_FILE_LINKS_COUNT {
            return Err(FsError::CorruptStructure(
                "cabecera con cantidad de descriptores absurda",
            ));
        }
        // La imagen completa (tablas + bitmap + datos) tiene que caber
        // en el archivo; todo con aritmética verificada
        let tables_size = Superblock::SIZE as u64
            + superblock.descriptors_count as u64 * Descriptor::SIZE as u64
            + superblock.total_links() as u64 * Link::SIZE as u64;
        let required_size = superblock
            .blocks_count
            .checked_mul(superblock.block_size as u64 + 1) // datos + bitmap
            .and_then(|blocks| blocks.checked_add(tables_size))
            .ok_or(FsError::CorruptStructure("cabecera con geometría desbordante"))?;
        if required_size > file.metadata()?.len() {
            return Err(FsError::CorruptStructure(
                "la geometría de la cabecera no cabe en el archivo",
            ));
        }

        let layout = Layout::from_superblock(&superblock);
        log::debug!(
            "contenedor abierto: {} bloques de {}B, {} descriptores",
            superblock.blocks_count,
            superblock.block_size,
            superblock.descriptors_count
        );

        Ok(Self { file, path, superblock, layout })
    }

    /// Formatea `path` como contenedor nuevo y lo deja listo en disco.
    ///
    /// Primero se resuelve la geometría; si el tamaño no alcanza, el archivo
    /// destino no se crea ni se trunca.
    pub fn format<P: AsRef<Path>>(
        path: P,
        total_size: u64,
        block_size: u32,
        descriptors_count: u32,
    ) -> Result<(), FsError> {
        let blocks_count = fit_blocks_count(total_size, block_size, descriptors_count)?;

        let superblock = Superblock {
            block_size,
            blocks_count,
            descriptors_count,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(total_size)?;
        file.seek(SeekFrom::Start(0))?;

        file.write_all(&superblock.encode())?;
        // Bitmap: todos los bloques libres
        file.write_all(&vec![0u8; blocks_count as usize])?;
        // Tablas de descriptores y enlaces: registros por defecto
        // (los "vacíos" llevan centinelas, no bytes en cero)
        let empty_descriptor = Descriptor::default().encode();
        for _ in 0..descriptors_count {
            file.write_all(&empty_descriptor)?;
        }
        let empty_link = Link::default().encode();
        for _ in 0..superblock.total_links() {
            file.write_all(&empty_link)?;
        }

        log::info!(
            "formateado {:?}: {} bloques de {}B, {} descriptores",
            path.as_ref(),
            blocks_count,
            block_size,
            descriptors_count
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), FsError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub(crate) fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), FsError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    // --- TABLA DE DESCRIPTORES ---

    pub fn read_descriptor(&mut self, index: u32) -> Result<Descriptor, FsError> {
        if index >= self.superblock.descriptors_count {
            return Err(FsError::CorruptStructure("índice de descriptor fuera de rango"));
        }
        let mut buf = vec![0u8; Descriptor::SIZE];
        self.read_at(self.layout.descriptor_offset(index), &mut buf)?;
        Descriptor::decode(&buf)
    }

    pub fn write_descriptor(&mut self, index: u32, descriptor: &Descriptor) -> Result<(), FsError> {
        if index >= self.superblock.descriptors_count {
            return Err(FsError::CorruptStructure("índice de descriptor fuera de rango"));
        }
        self.write_at(self.layout.descriptor_offset(index), &descriptor.encode())
    }

    // --- TABLA DE ENLACES ---

    pub fn read_link(&mut self, index: u32) -> Result<Link, FsError> {
        if index >= self.superblock.total_links() {
            return Err(FsError::CorruptStructure("índice de enlace fuera de rango"));
        }
        let mut buf = vec![0u8; Link::SIZE];
        self.read_at(self.layout.link_offset(index), &mut buf)?;
        Link::decode(&buf)
    }

    pub fn write_link(&mut self, index: u32, link: &Link) -> Result<(), FsError> {
        if index >= self.superblock.total_links() {
            return Err(FsError::CorruptStructure("índice de enlace fuera de rango"));
        }
        self.write_at(self.layout.link_offset(index), &link.encode())
    }

    // --- REGIÓN DE DATOS ---

    /// Lee el contenido completo de un bloque de datos.
    pub fn read_block(&mut self, index: u64) -> Result<Vec<u8>, FsError> {
        if index >= self.superblock.blocks_count {
            return Err(FsError::CorruptStructure("índice de bloque fuera de rango"));
        }
        let mut buf = vec![0u8; self.superblock.block_size as usize];
        self.read_at(self.layout.block_offset(index, self.superblock.block_size), &mut buf)?;
        Ok(buf)
    }

    /// Escribe el contenido completo de un bloque de datos.
    pub fn write_block(&mut self, index: u64, data: &[u8]) -> Result<(), FsError> {
        if index >= self.superblock.blocks_count {
            return Err(FsError::CorruptStructure("índice de bloque fuera de rango"));
        }
        if data.len() != self.superblock.block_size as usize {
            return Err(FsError::CorruptStructure("escritura de bloque con tamaño parcial"));
        }
        self.write_at(self.layout.block_offset(index, self.superblock.block_size), data)
    }
}
