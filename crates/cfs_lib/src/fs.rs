use std::path::{Path, PathBuf};

use crate::device::Container;
use crate::error::FsError;
use crate::open_files::OpenFileTable;
use crate::state::{PersistedState, StateStore};
use crate::types::{
    Descriptor, FsInfo, Link, MAX_FILE_BLOCKS_COUNT, MAX_FILE_LINKS_COUNT, MAX_FILE_NAME_LENGTH,
};

/// Entrada del listado de archivos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub descriptor_index: u32,
    pub is_opened: bool,
}

/// Atributos de un archivo puntual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub descriptor_index: u32,
    pub file_size: u64,
    pub blocks_count: u64,
    pub links_count: u32,
}

/// Resultado de un truncate que no falló.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateOutcome {
    Grown,
    Shrunk,
    /// La cantidad de bloques no cambió (solo se actualizó el tamaño).
    Unchanged,
}

/// Facade del sistema de archivos.
///
/// Cada invocación del proceso construye uno con `restore`, que relee del
/// almacén inyectado la ruta montada y la tabla de archivos abiertos. Todas
/// las operaciones devuelven resultados tipados; imprimir es trabajo del
/// llamador. Tras cada mutación se recalcula el resumen (`FsInfo`).
pub struct FileSystem {
    store: Box<dyn StateStore>,
    container: Option<Container>,
    info: Option<FsInfo>,
    open_files: OpenFileTable,
}

impl FileSystem {
    /// Reconstruye el estado de la invocación anterior.
    ///
    /// Si la ruta recordada ya no se puede abrir, se arranca desmontado
    /// (el estado persistido se corrige en el próximo mount/umount).
    pub fn restore(store: Box<dyn StateStore>) -> Result<Self, FsError> {
        let state = store.load()?;
        let mut fs = Self {
            store,
            container: None,
            info: None,
            open_files: OpenFileTable::from_map(state.open_files),
        };

        if let Some(path) = state.container_path {
            match Container::open(&path) {
                Ok(container) => {
                    fs.container = Some(container);
                    fs.refresh_info()?;
                }
                Err(err) => {
                    log::warn!("no se pudo remontar {path:?}: {err}");
                }
            }
        }
        Ok(fs)
    }

    pub fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    // --- HELPERS INTERNOS ---

    fn container_mut(&mut self) -> Result<&mut Container, FsError> {
        self.container.as_mut().ok_or(FsError::NotMounted)
    }

    fn info(&self) -> Result<&FsInfo, FsError> {
        self.info.as_ref().ok_or(FsError::NotMounted)
    }

    /// Reescanea bitmap, descriptores y enlaces para rearmar el resumen.
    fn refresh_info(&mut self) -> Result<(), FsError> {
        let container = self.container.as_mut().ok_or(FsError::NotMounted)?;
        let superblock = *container.superblock();
        let container_path = container.path().to_path_buf();

        let (used_blocks_count, free_blocks_count) = container.count_block_states()?;

        let mut used_descriptors_count = 0;
        for index in 0..superblock.descriptors_count {
            if container.read_descriptor(index)?.links_count > 0 {
                used_descriptors_count += 1;
            }
        }

        let links_count = superblock.total_links();
        let mut used_links_count = 0;
        for index in 0..links_count {
            if container.read_link(index)?.is_used() {
                used_links_count += 1;
            }
        }

        self.info = Some(FsInfo {
            container_path,
            block_size: superblock.block_size,
            blocks_count: superblock.blocks_count,
            used_blocks_count,
            free_blocks_count,
            descriptors_count: superblock.descriptors_count,
            used_descriptors_count,
            free_descriptors_count: superblock.descriptors_count - used_descriptors_count,
            links_count,
            used_links_count,
            available_links_count: links_count - used_links_count,
        });
        Ok(())
    }

    fn persist_state(&self) -> Result<(), FsError> {
        let state = PersistedState {
            container_path: self.container.as_ref().map(|c| c.path().to_path_buf()),
            open_files: self.open_files.as_map().clone(),
        };
        self.store.save(&state)?;
        Ok(())
    }

    fn validate_name(name: &str) -> Result<(), FsError> {
        // NUL es el terminador del relleno en disco; un nombre que lo
        // contenga quedaría truncado al releerlo
        if name.is_empty() || name.contains('\0') {
            return Err(FsError::IllegalName);
        }
        if name.len() > MAX_FILE_NAME_LENGTH {
            return Err(FsError::NameTooLong { limit: MAX_FILE_NAME_LENGTH });
        }
        Ok(())
    }

    /// Busca un nombre entre los enlaces en uso.
    fn lookup(&mut self, name: &str) -> Result<Option<(u32, u32)>, FsError> {
        let total_links = self.info()?.links_count;
        let container = self.container_mut()?;
        for index in 0..total_links {
            let link = container.read_link(index)?;
            if link.is_used() && link.name == name {
                // is_used garantiza el índice
                let descriptor_index = link
                    .descriptor_index
                    .ok_or(FsError::CorruptStructure("enlace en uso sin descriptor"))?;
                return Ok(Some((index, descriptor_index)));
            }
        }
        Ok(None)
    }

    // --- OPERACIONES ---

    /// Formatea `path` como contenedor nuevo. No lo monta.
    ///
    /// Si justamente ese contenedor estaba montado, se desmonta primero.
    pub fn format<P: AsRef<Path>>(
        &mut self,
        path: P,
        size: u64,
        block_size: u32,
        descriptors_count: u32,
    ) -> Result<(), FsError> {
        let path = path.as_ref();
        let target = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mounted_here = self
            .container
            .as_ref()
            .is_some_and(|c| c.path() == target || c.path() == path);
        if mounted_here {
            let _ = self.umount();
        }

        Container::format(path, size, block_size, descriptors_count)
    }

    /// Monta el contenedor en `path` y recuerda la ruta para la próxima invocación.
    pub fn mount<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FsError> {
        // Cualquier montaje previo se suelta primero (y con él, los abiertos)
        if self.container.is_some() {
            let _ = self.umount();
        } else {
            self.open_files.clear();
        }

        let canonical = std::fs::canonicalize(path.as_ref())?;
        let container = Container::open(&canonical)?;
        log::debug!("montado {canonical:?}");
        self.container = Some(container);
        self.refresh_info()?;
        self.persist_state()?;
        Ok(())
    }

    /// Desmonta el contenedor actual. Devuelve la ruta que estaba montada.
    pub fn umount(&mut self) -> Result<PathBuf, FsError> {
        // Se cierran todos los archivos abiertos, haya o no montaje
        self.open_files.clear();

        match self.container.take() {
            Some(container) => {
                let path = container.path().to_path_buf();
                self.info = None;
                self.persist_state()?;
                log::debug!("desmontado {path:?}");
                Ok(path)
            }
            None => {
                self.persist_state()?;
                Err(FsError::NotMounted)
            }
        }
    }

    /// Crea un archivo vacío con su primer enlace.
    pub fn create(&mut self, name: &str) -> Result<(), FsError> {
        Self::validate_name(name)?;

        let info = self.info()?;
        if info.free_descriptors_count == 0 {
            return Err(FsError::DescriptorTableFull);
        }
        let total_links = info.links_count;
        let descriptors_count = info.descriptors_count;

        // Un solo recorrido: colisión de nombre y primer hueco libre
        let mut free_link_index = None;
        {
            let container = self.container_mut()?;
            for index in 0..total_links {
                let link = container.read_link(index)?;
                if link.is_used() {
                    if link.name == name {
                        return Err(FsError::NameConflict);
                    }
                } else if free_link_index.is_none() {
                    free_link_index = Some(index);
                }
            }
        }
        let link_index = free_link_index.ok_or(FsError::LinkTableFull)?;

        // Primer descriptor libre
        let container = self.container_mut()?;
        let mut descriptor_index = None;
        for index in 0..descriptors_count {
            if container.read_descriptor(index)?.links_count == 0 {
                descriptor_index = Some(index);
                break;
            }
        }
        let descriptor_index = descriptor_index.ok_or(FsError::DescriptorTableFull)?;

        let descriptor = Descriptor { links_count: 1, ..Descriptor::default() };
        container.write_descriptor(descriptor_index, &descriptor)?;
        container.write_link(link_index, &Link::new(name, descriptor_index))?;

        self.refresh_info()?;
        Ok(())
    }

    /// Crea un enlace adicional `link_name` hacia el archivo `name`.
    pub fn link(&mut self, name: &str, link_name: &str) -> Result<(), FsError> {
        Self::validate_name(link_name)?;

        let total_links = self.info()?.links_count;
        let container = self.container_mut()?;

        // Un solo recorrido: colisión, descriptor origen y primer hueco libre
        let mut free_link_index = None;
        let mut descriptor_index = None;
        for index in 0..total_links {
            let link = container.read_link(index)?;
            if link.is_used() {
                if link.name == link_name {
                    return Err(FsError::NameConflict);
                }
                if link.name == name {
                    descriptor_index = link.descriptor_index;
                }
            } else if free_link_index.is_none() {
                free_link_index = Some(index);
            }
        }

        let descriptor_index = descriptor_index.ok_or(FsError::NoSuchFile)?;
        let link_index = free_link_index.ok_or(FsError::LinkTableFull)?;

        let mut descriptor = container.read_descriptor(descriptor_index)?;
        if descriptor.links_count >= MAX_FILE_LINKS_COUNT {
            return Err(FsError::LinkLimitExceeded);
        }
        descriptor.links_count += 1;
        container.write_descriptor(descriptor_index, &descriptor)?;
        container.write_link(link_index, &Link::new(link_name, descriptor_index))?;

        self.refresh_info()?;
        Ok(())
    }

    /// Elimina el enlace `link_name`. Si era el último, libera el archivo
    /// completo: sus bloques vuelven al bitmap y el descriptor queda vacío.
    pub fn unlink(&mut self, link_name: &str) -> Result<(), FsError> {
        let (link_index, descriptor_index) =
            self.lookup(link_name)?.ok_or(FsError::NoSuchFile)?;

        let container = self.container_mut()?;
        let mut descriptor = container.read_descriptor(descriptor_index)?;

        if descriptor.links_count <= 1 {
            // Último enlace: devolver todos los bloques del archivo
            for block in descriptor.blocks.iter().take_while(|b| b.is_some()) {
                let index = block.ok_or(FsError::CorruptStructure("bloque esperado ausente"))?;
                container.set_block_state(index, false)?;
            }
            descriptor = Descriptor::default();
        } else {
            descriptor.links_count -= 1;
        }

        container.write_descriptor(descriptor_index, &descriptor)?;
        container.write_link(link_index, &Link::default())?;

        self.refresh_info()?;
        Ok(())
    }

    /// Abre un archivo por nombre y devuelve su fd.
    ///
    /// Reabrir un archivo ya abierto devuelve el mismo fd.
    pub fn open(&mut self, name: &str) -> Result<u32, FsError> {
        let (_, descriptor_index) = self.lookup(name)?.ok_or(FsError::NoSuchFile)?;
        let fd = self.open_files.open(descriptor_index)?;
        self.persist_state()?;
        Ok(fd)
    }

    /// Cierra exactamente el fd indicado.
    pub fn close(&mut self, fd: u32) -> Result<(), FsError> {
        if self.container.is_none() {
            return Err(FsError::NotMounted);
        }
        self.open_files.close(fd)?;
        self.persist_state()?;
        Ok(())
    }

    /// Cierra todos los archivos abiertos.
    pub fn close_all(&mut self) -> Result<(), FsError> {
        if self.container.is_none() {
            return Err(FsError::NotMounted);
        }
        self.open_files.clear();
        self.persist_state()?;
        Ok(())
    }

    /// Lee `size` bytes desde `offset` del archivo abierto en `fd`.
    pub fn read(&mut self, fd: u32, offset: u64, size: u64) -> Result<Vec<u8>, FsError> {
        if self.container.is_none() {
            return Err(FsError::NotMounted);
        }
        let descriptor_index = self
            .open_files
            .descriptor_for(fd)
            .ok_or(FsError::InvalidDescriptor(fd))?;

        let container = self.container_mut()?;
        let block_size = container.superblock().block_size as u64;
        let descriptor = container.read_descriptor(descriptor_index)?;

        let end = offset.checked_add(size).ok_or(FsError::OutOfFileBounds)?;
        if end > descriptor.file_size {
            return Err(FsError::OutOfFileBounds);
        }

        // Recorrido bloque a bloque del rango pedido
        let mut data = Vec::with_capacity(size as usize);
        let mut current_offset = offset;
        let mut remaining = size;
        while remaining > 0 {
            let block_number = (current_offset / block_size) as usize;
            let start_byte = (current_offset % block_size) as usize;
            let chunk = (block_size - start_byte as u64).min(remaining) as usize;

            let block_index = descriptor
                .blocks
                .get(block_number)
                .copied()
                .flatten()
                .ok_or(FsError::CorruptStructure("bloque esperado ausente en el descriptor"))?;

            let payload = container.read_block(block_index)?;
            data.extend_from_slice(&payload[start_byte..start_byte + chunk]);

            current_offset += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(data)
    }

    /// Escribe `data` en `offset` del archivo abierto en `fd`.
    ///
    /// No agranda el archivo: el rango completo debe estar dentro del
    /// tamaño ya asignado (truncate primero para extender).
    pub fn write(&mut self, fd: u32, offset: u64, data: &[u8]) -> Result<(), FsError> {
        if self.container.is_none() {
            return Err(FsError::NotMounted);
        }
        let descriptor_index = self
            .open_files
            .descriptor_for(fd)
            .ok_or(FsError::InvalidDescriptor(fd))?;

        let container = self.container_mut()?;
        let block_size = container.superblock().block_size as u64;
        let descriptor = container.read_descriptor(descriptor_index)?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::WriteBeyondAllocatedSize)?;
        if end > descriptor.file_size {
            return Err(FsError::WriteBeyondAllocatedSize);
        }

        // Leer-modificar-escribir por cada bloque tocado
        let mut written = 0usize;
        let mut current_offset = offset;
        while written < data.len() {
            let block_number = (current_offset / block_size) as usize;
            let start_byte = (current_offset % block_size) as usize;
            let chunk = ((block_size as usize) - start_byte).min(data.len() - written);

            let block_index = descriptor
                .blocks
                .get(block_number)
                .copied()
                .flatten()
                .ok_or(FsError::CorruptStructure("bloque esperado ausente en el descriptor"))?;

            let mut payload = container.read_block(block_index)?;
            payload[start_byte..start_byte + chunk]
                .copy_from_slice(&data[written..written + chunk]);
            container.write_block(block_index, &payload)?;

            written += chunk;
            current_offset += chunk as u64;
        }
        Ok(())
    }

    /// Cambia el tamaño del archivo `name` a `new_size` bytes.
    ///
    /// Al encoger se liberan los bloques sobrantes desde el final; al crecer
    /// la asignación es todo-o-nada: si no alcanzan los bloques libres no se
    /// asigna ninguno.
    pub fn truncate(&mut self, name: &str, new_size: u64) -> Result<TruncateOutcome, FsError> {
        let (_, descriptor_index) = self.lookup(name)?.ok_or(FsError::NoSuchFile)?;
        let free_blocks_count = self.info()?.free_blocks_count;

        let container = self.container_mut()?;
        let block_size = container.superblock().block_size as u64;
        let mut descriptor = container.read_descriptor(descriptor_index)?;

        let target_blocks = (new_size.div_ceil(block_size)) as usize;
        if target_blocks > MAX_FILE_BLOCKS_COUNT {
            return Err(FsError::InsufficientSpace);
        }
        let current_blocks = descriptor.used_blocks_count();

        let outcome = if target_blocks < current_blocks {
            // Encoger: liberar desde el bloque más alto hacia abajo
            for i in (target_blocks..current_blocks).rev() {
                let block_index = descriptor.blocks[i]
                    .ok_or(FsError::CorruptStructure("bloque esperado ausente"))?;
                container.set_block_state(block_index, false)?;
                descriptor.blocks[i] = None;
            }
            TruncateOutcome::Shrunk
        } else if target_blocks > current_blocks {
            // Crecer: verificar espacio ANTES de asignar (todo-o-nada)
            let required = (target_blocks - current_blocks) as u64;
            if required > free_blocks_count {
                log::debug!("truncate de '{name}' necesita {required} bloques y hay {free_blocks_count}");
                return Err(FsError::InsufficientSpace);
            }
            for i in current_blocks..target_blocks {
                let block_index = container
                    .find_free_block()?
                    .ok_or(FsError::InsufficientSpace)?;
                container.set_block_state(block_index, true)?;
                descriptor.blocks[i] = Some(block_index);
            }
            TruncateOutcome::Grown
        } else {
            TruncateOutcome::Unchanged
        };

        descriptor.file_size = new_size;
        container.write_descriptor(descriptor_index, &descriptor)?;

        self.refresh_info()?;
        Ok(outcome)
    }

    /// Lista todos los enlaces en uso.
    pub fn list(&mut self) -> Result<Vec<FileEntry>, FsError> {
        let total_links = self.info()?.links_count;

        let mut entries = Vec::new();
        for index in 0..total_links {
            let link = self.container_mut()?.read_link(index)?;
            if let Some(descriptor_index) = link.descriptor_index {
                entries.push(FileEntry {
                    name: link.name,
                    descriptor_index,
                    is_opened: self.open_files.is_descriptor_open(descriptor_index),
                });
            }
        }
        Ok(entries)
    }

    /// Atributos del archivo `name`.
    pub fn filestat(&mut self, name: &str) -> Result<FileStat, FsError> {
        let (_, descriptor_index) = self.lookup(name)?.ok_or(FsError::NoSuchFile)?;
        let descriptor = self.container_mut()?.read_descriptor(descriptor_index)?;

        Ok(FileStat {
            name: name.to_string(),
            descriptor_index,
            file_size: descriptor.file_size,
            blocks_count: descriptor.used_blocks_count() as u64,
            links_count: descriptor.links_count,
        })
    }

    /// Resumen agregado del sistema montado.
    pub fn describe(&self) -> Result<FsInfo, FsError> {
        self.info().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemStateStore;
    use std::fs;

    fn temp_container(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cfs_fs_{name}.img"))
    }

    /// Sistema recién formateado y montado sobre un contenedor temporal.
    fn mounted_fs(name: &str, size: u64) -> (FileSystem, PathBuf) {
        let path = temp_container(name);
        let _ = fs::remove_file(&path);

        let mut fs = FileSystem::restore(Box::new(MemStateStore::new())).unwrap();
        fs.format(&path, size, 512, 16).unwrap();
        fs.mount(&path).unwrap();
        (fs, path)
    }

    // Costo fijo para 16 descriptores: 16 + 16*2060 + 128*132 = 49872 bytes.
    // Con 49872 + 4*513 + 2 bytes el ajuste deja exactamente 4 bloques.
    const FOUR_BLOCK_SIZE: u64 = 49872 + 4 * 513 + 2;

    #[test]
    fn test_reference_scenario() {
        let (mut fs, path) = mounted_fs("reference_scenario", 1_048_576);

        fs.create("a.txt").unwrap();
        assert_eq!(fs.truncate("a.txt", 1000).unwrap(), TruncateOutcome::Grown);
        assert_eq!(fs.filestat("a.txt").unwrap().blocks_count, 2);

        let fd = fs.open("a.txt").unwrap();
        assert_eq!(fd, 0);

        let payload = vec![b'A'; 500];
        fs.write(fd, 0, &payload).unwrap();
        assert_eq!(fs.read(fd, 0, 500).unwrap(), payload);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_read_roundtrip_across_blocks() {
        let (mut fs, path) = mounted_fs("roundtrip_cross", 1_048_576);

        fs.create("x").unwrap();
        fs.truncate("x", 1500).unwrap(); // 3 bloques de 512
        let fd = fs.open("x").unwrap();

        // Rango que cruza el límite entre el bloque 0 y el 1
        let data: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        fs.write(fd, 400, &data).unwrap();
        assert_eq!(fs.read(fd, 400, 600).unwrap(), data);

        // Lo escrito no pisó los bytes vecinos
        assert_eq!(fs.read(fd, 399, 1).unwrap(), vec![0]);
        assert_eq!(fs.read(fd, 1000, 1).unwrap(), vec![0]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let (mut fs, path) = mounted_fs("read_bounds", 1_048_576);

        fs.create("x").unwrap();
        fs.truncate("x", 1000).unwrap();
        let fd = fs.open("x").unwrap();

        assert!(matches!(fs.read(fd, 600, 500), Err(FsError::OutOfFileBounds)));
        assert!(matches!(fs.read(fd, 1001, 0), Err(FsError::OutOfFileBounds)));
        // Justo hasta el final sí
        assert_eq!(fs.read(fd, 500, 500).unwrap().len(), 500);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_does_not_grow_file() {
        let (mut fs, path) = mounted_fs("write_no_grow", 1_048_576);

        fs.create("x").unwrap();
        fs.truncate("x", 1000).unwrap();
        let fd = fs.open("x").unwrap();

        assert!(matches!(
            fs.write(fd, 900, &[0u8; 200]),
            Err(FsError::WriteBeyondAllocatedSize)
        ));
        // El tamaño no cambió
        assert_eq!(fs.filestat("x").unwrap().file_size, 1000);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unopened_fd_is_invalid() {
        let (mut fs, path) = mounted_fs("invalid_fd", 1_048_576);

        assert!(matches!(fs.read(42, 0, 1), Err(FsError::InvalidDescriptor(42))));
        assert!(matches!(fs.write(42, 0, &[1]), Err(FsError::InvalidDescriptor(42))));
        assert!(matches!(fs.close(42), Err(FsError::InvalidDescriptor(42))));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut fs, path) = mounted_fs("open_idempotent", 1_048_576);

        fs.create("a").unwrap();
        fs.create("b").unwrap();

        let fd_a = fs.open("a").unwrap();
        let fd_b = fs.open("b").unwrap();
        assert_ne!(fd_a, fd_b);
        // Reabrir sin cerrar devuelve el mismo fd
        assert_eq!(fs.open("a").unwrap(), fd_a);

        fs.close(fd_a).unwrap();
        // Ahora sí es una apertura nueva (el hueco 0 se reutiliza)
        assert_eq!(fs.open("a").unwrap(), fd_a);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_create_conflict_leaves_everything_unchanged() {
        let (mut fs, path) = mounted_fs("create_conflict", 1_048_576);

        fs.create("a").unwrap();
        let before = fs.describe().unwrap();

        assert!(matches!(fs.create("a"), Err(FsError::NameConflict)));

        assert_eq!(fs.describe().unwrap(), before);
        assert_eq!(fs.list().unwrap().len(), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_name_validation() {
        let (mut fs, path) = mounted_fs("name_validation", 1_048_576);

        assert!(matches!(fs.create(""), Err(FsError::IllegalName)));
        let long = "x".repeat(MAX_FILE_NAME_LENGTH + 1);
        assert!(matches!(fs.create(&long), Err(FsError::NameTooLong { .. })));
        // 128 bytes exactos todavía es válido
        fs.create(&"y".repeat(MAX_FILE_NAME_LENGTH)).unwrap();

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_name_with_interior_nul_is_illegal() {
        let (mut fs, path) = mounted_fs("nul_name", 1_048_576);

        // Un NUL interior se confundiría con el relleno del nombre en
        // disco y dejaría el archivo inencontrable (o un nombre duplicado)
        assert!(matches!(fs.create("a\0b"), Err(FsError::IllegalName)));
        assert!(fs.list().unwrap().is_empty());

        fs.create("a").unwrap();
        assert!(matches!(fs.link("a", "a\0c"), Err(FsError::IllegalName)));
        assert_eq!(fs.list().unwrap().len(), 1);
        assert_eq!(fs.filestat("a").unwrap().links_count, 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_truncate_grow_is_all_or_nothing() {
        let (mut fs, path) = mounted_fs("truncate_atomic", FOUR_BLOCK_SIZE);
        assert_eq!(fs.describe().unwrap().blocks_count, 4);

        fs.create("a").unwrap();
        fs.truncate("a", 3 * 512).unwrap(); // quedan 1 libre

        // Crecer 2 bloques con 1 libre: falla sin asignar nada
        assert!(matches!(
            fs.truncate("a", 5 * 512),
            Err(FsError::InsufficientSpace)
        ));

        let stat = fs.filestat("a").unwrap();
        assert_eq!(stat.file_size, 3 * 512);
        assert_eq!(stat.blocks_count, 3);
        assert_eq!(fs.describe().unwrap().free_blocks_count, 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_truncate_shrink_frees_trailing_blocks() {
        let (mut fs, path) = mounted_fs("truncate_shrink", 1_048_576);

        fs.create("a").unwrap();
        assert_eq!(fs.truncate("a", 2000).unwrap(), TruncateOutcome::Grown);
        assert_eq!(fs.filestat("a").unwrap().blocks_count, 4);
        let used_before = fs.describe().unwrap().used_blocks_count;

        assert_eq!(fs.truncate("a", 600).unwrap(), TruncateOutcome::Shrunk);
        let stat = fs.filestat("a").unwrap();
        assert_eq!(stat.blocks_count, 2);
        assert_eq!(stat.file_size, 600);
        assert_eq!(fs.describe().unwrap().used_blocks_count, used_before - 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_truncate_same_block_count_updates_size() {
        let (mut fs, path) = mounted_fs("truncate_same", 1_048_576);

        fs.create("a").unwrap();
        fs.truncate("a", 1000).unwrap();
        assert_eq!(fs.truncate("a", 900).unwrap(), TruncateOutcome::Unchanged);

        let stat = fs.filestat("a").unwrap();
        assert_eq!(stat.file_size, 900);
        assert_eq!(stat.blocks_count, 2);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_truncate_beyond_max_file_size() {
        let (mut fs, path) = mounted_fs("truncate_max", 1_048_576);

        fs.create("a").unwrap();
        let too_big = (MAX_FILE_BLOCKS_COUNT as u64) * 512 + 1;
        assert!(matches!(
            fs.truncate("a", too_big),
            Err(FsError::InsufficientSpace)
        ));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unlink_frees_exactly_owned_blocks() {
        let (mut fs, path) = mounted_fs("unlink_frees", 1_048_576);

        fs.create("a").unwrap();
        fs.create("b").unwrap();
        fs.truncate("a", 1024).unwrap(); // 2 bloques
        fs.truncate("b", 512).unwrap(); // 1 bloque

        let before = fs.describe().unwrap();
        assert_eq!(before.used_blocks_count, 3);

        fs.unlink("a").unwrap();

        let after = fs.describe().unwrap();
        assert_eq!(after.used_blocks_count, 1);
        assert_eq!(after.used_descriptors_count, 1);
        // El archivo restante quedó intacto
        assert_eq!(fs.filestat("b").unwrap().blocks_count, 1);
        assert!(matches!(fs.filestat("a"), Err(FsError::NoSuchFile)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_bitmap_matches_descriptor_ownership() {
        let (mut fs, path) = mounted_fs("bitmap_invariant", 1_048_576);

        fs.create("a").unwrap();
        fs.create("b").unwrap();
        fs.create("c").unwrap();
        fs.truncate("a", 700).unwrap();
        fs.truncate("b", 1500).unwrap();
        fs.truncate("c", 512).unwrap();
        fs.unlink("b").unwrap();
        fs.truncate("a", 2000).unwrap();

        // Invariante: bloques marcados usados == suma de bloques poseídos
        let owned: u64 = ["a", "c"]
            .iter()
            .map(|name| fs.filestat(name).unwrap().blocks_count)
            .sum();
        assert_eq!(fs.describe().unwrap().used_blocks_count, owned);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_hard_links_share_descriptor() {
        let (mut fs, path) = mounted_fs("hard_links", 1_048_576);

        fs.create("original").unwrap();
        fs.truncate("original", 512).unwrap();
        fs.link("original", "alias").unwrap();

        let stat = fs.filestat("alias").unwrap();
        assert_eq!(stat.links_count, 2);
        assert_eq!(
            stat.descriptor_index,
            fs.filestat("original").unwrap().descriptor_index
        );

        // Quitar un enlace no libera los datos
        fs.unlink("original").unwrap();
        let stat = fs.filestat("alias").unwrap();
        assert_eq!(stat.links_count, 1);
        assert_eq!(stat.blocks_count, 1);

        // Quitar el último sí
        fs.unlink("alias").unwrap();
        assert_eq!(fs.describe().unwrap().used_blocks_count, 0);
        assert_eq!(fs.describe().unwrap().used_descriptors_count, 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_link_limit() {
        let (mut fs, path) = mounted_fs("link_limit", 1_048_576);

        fs.create("f").unwrap();
        for i in 1..MAX_FILE_LINKS_COUNT {
            fs.link("f", &format!("f{i}")).unwrap();
        }
        assert!(matches!(
            fs.link("f", "overflow"),
            Err(FsError::LinkLimitExceeded)
        ));
        assert_eq!(fs.filestat("f").unwrap().links_count, MAX_FILE_LINKS_COUNT);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_link_to_missing_file() {
        let (mut fs, path) = mounted_fs("link_missing", 1_048_576);

        assert!(matches!(fs.link("nada", "alias"), Err(FsError::NoSuchFile)));
        assert!(matches!(fs.unlink("nada"), Err(FsError::NoSuchFile)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_descriptor_table_full() {
        let (mut fs, path) = mounted_fs("descriptors_full", 1_048_576);

        for i in 0..16 {
            fs.create(&format!("f{i}")).unwrap();
        }
        assert!(matches!(fs.create("uno_mas"), Err(FsError::DescriptorTableFull)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_list_marks_opened_files() {
        let (mut fs, path) = mounted_fs("list_opened", 1_048_576);

        fs.create("a").unwrap();
        fs.create("b").unwrap();
        fs.open("b").unwrap();

        let mut entries = fs.list().unwrap();
        entries.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_opened);
        assert!(entries[1].is_opened);

        // Un alias del mismo descriptor también figura como abierto
        fs.link("b", "b2").unwrap();
        let entries = fs.list().unwrap();
        let alias = entries.iter().find(|e| e.name == "b2").unwrap();
        assert!(alias.is_opened);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_operations_require_mount() {
        let mut fs = FileSystem::restore(Box::new(MemStateStore::new())).unwrap();
        assert!(!fs.is_mounted());

        assert!(matches!(fs.create("a"), Err(FsError::NotMounted)));
        assert!(matches!(fs.open("a"), Err(FsError::NotMounted)));
        assert!(matches!(fs.read(0, 0, 1), Err(FsError::NotMounted)));
        assert!(matches!(fs.list(), Err(FsError::NotMounted)));
        assert!(matches!(fs.describe(), Err(FsError::NotMounted)));
        assert!(matches!(fs.umount(), Err(FsError::NotMounted)));
    }

    #[test]
    fn test_format_too_small_reports_insufficient_space() {
        let path = temp_container("format_small");
        let _ = fs::remove_file(&path);

        let mut fs = FileSystem::restore(Box::new(MemStateStore::new())).unwrap();
        assert!(matches!(
            fs.format(&path, 1000, 512, 16),
            Err(FsError::InsufficientSpace)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_state_survives_restore() {
        let path = temp_container("state_survives");
        let _ = fs::remove_file(&path);
        let store = MemStateStore::new();

        // Primera "invocación": formatear, montar, crear y abrir
        {
            let mut fs = FileSystem::restore(Box::new(store.clone())).unwrap();
            fs.format(&path, 1_048_576, 512, 16).unwrap();
            fs.mount(&path).unwrap();
            fs.create("persistente").unwrap();
            assert_eq!(fs.open("persistente").unwrap(), 0);
        }

        // Segunda "invocación": el montaje y el fd siguen vivos
        {
            let mut fs = FileSystem::restore(Box::new(store.clone())).unwrap();
            assert!(fs.is_mounted());
            let entries = fs.list().unwrap();
            assert!(entries[0].is_opened);
            // Reabrir devuelve el fd recordado
            assert_eq!(fs.open("persistente").unwrap(), 0);
            fs.umount().unwrap();
        }

        // Tercera: el umount también persistió
        {
            let fs = FileSystem::restore(Box::new(store)).unwrap();
            assert!(!fs.is_mounted());
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_umount_closes_open_files() {
        let (mut fs, path) = mounted_fs("umount_closes", 1_048_576);

        fs.create("a").unwrap();
        fs.open("a").unwrap();
        fs.umount().unwrap();
        fs.mount(&path).unwrap();

        let entries = fs.list().unwrap();
        assert!(!entries[0].is_opened);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_format_mounted_container_unmounts_it() {
        let (mut fs, path) = mounted_fs("format_mounted", 1_048_576);

        fs.create("a").unwrap();
        fs.format(&path, 1_048_576, 512, 16).unwrap();
        assert!(!fs.is_mounted());

        // El contenido anterior desapareció con el formateo
        fs.mount(&path).unwrap();
        assert!(fs.list().unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_close_all() {
        let (mut fs, path) = mounted_fs("close_all", 1_048_576);

        fs.create("a").unwrap();
        fs.create("b").unwrap();
        fs.open("a").unwrap();
        fs.open("b").unwrap();

        fs.close_all().unwrap();
        assert!(fs.list().unwrap().iter().all(|e| !e.is_opened));

        let _ = fs::remove_file(&path);
    }
}
