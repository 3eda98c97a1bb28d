use crate::device::Container;
use crate::error::FsError;

/// Cara de asignación de bloques del contenedor.
///
/// El bitmap vive en disco como un byte por bloque (0 = libre, distinto
/// de cero = ocupado) y se consulta directo del archivo, sin copia en RAM.
impl Container {
    /// Verifica si un bloque está ocupado.
    pub fn block_state(&mut self, index: u64) -> Result<bool, FsError> {
        if index >= self.superblock().blocks_count {
            return Err(FsError::CorruptStructure("índice de bitmap fuera de rango"));
        }
        let mut byte = [0u8; 1];
        let offset = self.layout().bitmap_offset + index;
        self.read_at(offset, &mut byte)?;
        Ok(byte[0] != 0)
    }

    /// Marca un bloque como ocupado o libre.
    pub fn set_block_state(&mut self, index: u64, used: bool) -> Result<(), FsError> {
        if index >= self.superblock().blocks_count {
            return Err(FsError::CorruptStructure("índice de bitmap fuera de rango"));
        }
        let offset = self.layout().bitmap_offset + index;
        self.write_at(offset, &[if used { 1 } else { 0 }])
    }

    /// Busca el primer bloque libre (first-fit). `None` si el disco está lleno.
    pub fn find_free_block(&mut self) -> Result<Option<u64>, FsError> {
        for index in 0..self.superblock().blocks_count {
            if !self.block_state(index)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Recorre el bitmap completo y devuelve (usados, libres).
    pub fn count_block_states(&mut self) -> Result<(u64, u64), FsError> {
        let mut used = 0;
        let mut free = 0;
        for index in 0..self.superblock().blocks_count {
            if self.block_state(index)? {
                used += 1;
            } else {
                free += 1;
            }
        }
        Ok((used, free))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_container(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cfs_bitmap_{name}.img"))
    }

    fn formatted(name: &str) -> (Container, PathBuf) {
        let path = temp_container(name);
        let _ = fs::remove_file(&path);
        Container::format(&path, 1_048_576, 512, 16).unwrap();
        (Container::open(&path).unwrap(), path)
    }

    #[test]
    fn test_blocks_start_free() {
        let (mut container, path) = formatted("start_free");

        let blocks_count = container.superblock().blocks_count;
        let (used, free) = container.count_block_states().unwrap();
        assert_eq!(used, 0);
        assert_eq!(free, blocks_count);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_first_fit_skips_used_blocks() {
        let (mut container, path) = formatted("first_fit");

        // Ocupar el 0 y el 2; el primer libre debe ser el 1
        container.set_block_state(0, true).unwrap();
        container.set_block_state(2, true).unwrap();
        assert_eq!(container.find_free_block().unwrap(), Some(1));

        container.set_block_state(1, true).unwrap();
        assert_eq!(container.find_free_block().unwrap(), Some(3));

        // Liberar el 0 vuelve a dejarlo como primer candidato
        container.set_block_state(0, false).unwrap();
        assert_eq!(container.find_free_block().unwrap(), Some(0));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_exhausted_bitmap_returns_none() {
        let (mut container, path) = formatted("exhausted");

        let blocks_count = container.superblock().blocks_count;
        for i in 0..blocks_count {
            container.set_block_state(i, true).unwrap();
        }
        assert_eq!(container.find_free_block().unwrap(), None);

        let (used, free) = container.count_block_states().unwrap();
        assert_eq!(used, blocks_count);
        assert_eq!(free, 0);

        let _ = fs::remove_file(&path);
    }
}
