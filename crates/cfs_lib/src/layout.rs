use crate::error::FsError;
use crate::types::{Descriptor, Link, Superblock};

/// Offsets en bytes de cada región dentro del contenedor.
///
/// El orden en disco es fijo: cabecera, bitmap de bloques, tabla de
/// descriptores, tabla de enlaces y región de datos. Nada de esto se
/// guarda en disco: se deriva siempre de los tres campos de la cabecera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub bitmap_offset: u64,
    pub descriptors_offset: u64,
    pub links_offset: u64,
    pub data_offset: u64,
}

impl Layout {
    pub fn from_superblock(sb: &Superblock) -> Self {
        let bitmap_offset = Superblock::SIZE as u64;
        // Un byte por bloque en el bitmap
        let descriptors_offset = bitmap_offset + sb.blocks_count;
        let links_offset =
            descriptors_offset + sb.descriptors_count as u64 * Descriptor::SIZE as u64;
        let data_offset = links_offset + sb.total_links() as u64 * Link::SIZE as u64;

        Self {
            bitmap_offset,
            descriptors_offset,
            links_offset,
            data_offset,
        }
    }

    pub fn descriptor_offset(&self, index: u32) -> u64 {
        self.descriptors_offset + index as u64 * Descriptor::SIZE as u64
    }

    pub fn link_offset(&self, index: u32) -> u64 {
        self.links_offset + index as u64 * Link::SIZE as u64
    }

    pub fn block_offset(&self, index: u64, block_size: u32) -> u64 {
        self.data_offset + index * block_size as u64
    }
}

/// Calcula cuántos bloques caben al formatear un contenedor de `total_size` bytes.
///
/// El costo fijo (cabecera + descriptores + enlaces) no depende de la cantidad
/// de bloques; el bitmap sí. Se parte de la estimación `espacio_libre / block_size`
/// y se reduce de a un bloque hasta que bitmap + datos quepan, con una cota de
/// iteraciones igual a la estimación inicial.
pub fn fit_blocks_count(
    total_size: u64,
    block_size: u32,
    descriptors_count: u32,
) -> Result<u64, FsError> {
    if block_size == 0 || descriptors_count == 0 {
        log::warn!("geometría degenerada: block_size o descriptors_count en cero");
        return Err(FsError::InsufficientSpace);
    }

    let total_links = descriptors_count as u64 * crate::types::MAX_FILE_LINKS_COUNT as u64;
    let fixed_cost = Superblock::SIZE as u64
        + descriptors_count as u64 * Descriptor::SIZE as u64
        + total_links * Link::SIZE as u64;

    if total_size < fixed_cost {
        return Err(FsError::InsufficientSpace);
    }

    let free_size = total_size - fixed_cost;
    let mut blocks_count = free_size / block_size as u64;
    let mut bitmap_size = blocks_count; // un byte por bloque

    let max_iterations = blocks_count;
    let mut iterations = 0u64;
    while free_size < bitmap_size + blocks_count * block_size as u64
        && iterations <= max_iterations
        && blocks_count > 0
    {
        blocks_count -= 1;
        bitmap_size = blocks_count;
        iterations += 1;
    }

    if iterations > max_iterations || free_size < bitmap_size + blocks_count * block_size as u64 {
        return Err(FsError::InsufficientSpace);
    }

    Ok(blocks_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets_are_contiguous() {
        let sb = Superblock {
            block_size: 512,
            blocks_count: 100,
            descriptors_count: 16,
        };
        let layout = Layout::from_superblock(&sb);

        assert_eq!(layout.bitmap_offset, 16);
        assert_eq!(layout.descriptors_offset, 16 + 100);
        assert_eq!(
            layout.links_offset,
            layout.descriptors_offset + 16 * Descriptor::SIZE as u64
        );
        assert_eq!(
            layout.data_offset,
            layout.links_offset + 128 * Link::SIZE as u64
        );
        assert_eq!(layout.descriptor_offset(2), layout.descriptors_offset + 2 * 2060);
        assert_eq!(layout.link_offset(3), layout.links_offset + 3 * 132);
        assert_eq!(layout.block_offset(5, 512), layout.data_offset + 5 * 512);
    }

    #[test]
    fn test_fit_blocks_count_scenario() {
        // Escenario de referencia: 1 MiB, bloques de 512, 16 descriptores
        let blocks = fit_blocks_count(1_048_576, 512, 16).unwrap();

        // El resultado debe caber junto con su bitmap en el espacio libre
        let fixed = Superblock::SIZE as u64 + 16 * Descriptor::SIZE as u64 + 128 * Link::SIZE as u64;
        let free = 1_048_576 - fixed;
        assert!(blocks + blocks * 512 <= free);
        // Y agregar un bloque más ya no cabe
        assert!((blocks + 1) + (blocks + 1) * 512 > free);
    }

    #[test]
    fn test_fit_fails_when_headers_do_not_fit() {
        // Ni siquiera el costo fijo entra en 1000 bytes
        assert!(matches!(
            fit_blocks_count(1000, 512, 16),
            Err(FsError::InsufficientSpace)
        ));
    }

    #[test]
    fn test_fit_rejects_zero_geometry() {
        assert!(fit_blocks_count(1_048_576, 0, 16).is_err());
        assert!(fit_blocks_count(1_048_576, 512, 0).is_err());
    }
}
