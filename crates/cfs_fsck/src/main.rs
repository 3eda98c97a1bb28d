use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use clap::Parser;
use colored::*; // Para output bonito

use cfs_lib::device::Container;
use cfs_lib::types::MAX_FILE_BLOCKS_COUNT;

/// Verificador de consistencia fuera de línea para contenedores cfs.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Archivo contenedor a revisar (no debe estar montado)
    #[arg(value_name = "CONTENEDOR")]
    container: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("{}", "=== cfs File System Check (fsck) ===".bold().blue());

    if !args.container.exists() {
        anyhow::bail!("El contenedor no existe");
    }

    // 1. Abrir el contenedor y validar la cabecera
    println!("[*] Leyendo cabecera...");
    let mut container = Container::open(&args.container)?;
    let sb = *container.superblock();
    println!("    > Tamaño de bloque: {}B", sb.block_size);
    println!("    > Bloques totales:  {}", sb.blocks_count);
    println!("    > Descriptores:     {}", sb.descriptors_count);
    println!("{}", "[OK] Cabecera con geometría válida".green());

    let mut errors = 0u32;

    // 2. Recorrer descriptores y reconstruir qué bloques están REALMENTE en uso
    println!("[*] Analizando tabla de descriptores...");
    let mut calculated_used: HashSet<u64> = HashSet::new();
    let mut links_per_descriptor: HashMap<u32, u32> = HashMap::new();
    let mut active_descriptors = 0u32;

    for index in 0..sb.descriptors_count {
        let descriptor = container.read_descriptor(index)?;

        if descriptor.links_count == 0 {
            // Un descriptor libre debe estar completamente vacío
            if descriptor.file_size != 0 || descriptor.blocks.iter().any(|b| b.is_some()) {
                println!(
                    "    {} Descriptor {} libre pero con tamaño o bloques residuales",
                    "[ERROR]".red(),
                    index
                );
                errors += 1;
            }
            continue;
        }

        active_descriptors += 1;
        links_per_descriptor.insert(index, descriptor.links_count);

        // Los bloques ocupados deben ser contiguos desde el inicio (sin huecos)
        let used = descriptor.used_blocks_count();
        if descriptor.blocks[used..].iter().any(|b| b.is_some()) {
            println!(
                "    {} Descriptor {} tiene huecos en su lista de bloques",
                "[ERROR]".red(),
                index
            );
            errors += 1;
        }

        // La cantidad de bloques debe cubrir exactamente el tamaño declarado
        let expected = descriptor.file_size.div_ceil(sb.block_size as u64) as usize;
        if expected != used {
            println!(
                "    {} Descriptor {}: tamaño {} pide {} bloques pero posee {}",
                "[ERROR]".red(),
                index,
                descriptor.file_size,
                expected,
                used
            );
            errors += 1;
        }

        for block in descriptor.blocks.iter().take(used.min(MAX_FILE_BLOCKS_COUNT)) {
            let Some(block_index) = *block else { break };
            if block_index >= sb.blocks_count {
                println!(
                    "    {} Descriptor {} apunta a bloque fuera de rango: {}",
                    "[ERROR]".red(),
                    index,
                    block_index
                );
                errors += 1;
            } else if !calculated_used.insert(block_index) {
                println!(
                    "    {} Bloque {} poseído por más de un descriptor",
                    "[ERROR]".red(),
                    block_index
                );
                errors += 1;
            }
        }
    }
    println!("    > Descriptores activos: {}", active_descriptors);

    // 3. Comparar el bitmap guardado contra el recalculado
    println!("[*] Buscando inconsistencias en el bitmap...");
    for block_index in 0..sb.blocks_count {
        let marked_used = container.block_state(block_index)?;
        let really_used = calculated_used.contains(&block_index);

        // Falso libre: un archivo lo posee pero el bitmap dice libre -> GRAVE
        if really_used && !marked_used {
            println!(
                "    {} Bloque {} en uso por un archivo pero marcado LIBRE",
                "[CORRUPCIÓN]".red(),
                block_index
            );
            errors += 1;
        }
        // Falso ocupado: el bitmap dice ocupado pero nadie lo posee -> fuga
        if !really_used && marked_used {
            println!(
                "    {} Bloque {} marcado ocupado pero sin dueño (huérfano)",
                "[WARN]".yellow(),
                block_index
            );
        }
    }

    // 4. Revisar la tabla de enlaces
    println!("[*] Revisando tabla de enlaces...");
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut referenced: HashMap<u32, u32> = HashMap::new();

    for index in 0..sb.total_links() {
        let link = container.read_link(index)?;
        let Some(descriptor_index) = link.descriptor_index else {
            continue;
        };

        if link.name.is_empty() {
            println!("    {} Enlace {} en uso sin nombre", "[ERROR]".red(), index);
            errors += 1;
        } else if !seen_names.insert(link.name.clone()) {
            println!(
                "    {} Nombre duplicado en la tabla de enlaces: '{}'",
                "[ERROR]".red(),
                link.name
            );
            errors += 1;
        }

        if descriptor_index >= sb.descriptors_count {
            println!(
                "    {} Enlace '{}' apunta a descriptor fuera de rango: {}",
                "[ERROR]".red(),
                link.name,
                descriptor_index
            );
            errors += 1;
            continue;
        }
        *referenced.entry(descriptor_index).or_insert(0) += 1;
    }

    // El contador de enlaces de cada descriptor debe coincidir con las
    // entradas que realmente lo referencian
    for index in 0..sb.descriptors_count {
        let declared = links_per_descriptor.get(&index).copied().unwrap_or(0);
        let actual = referenced.get(&index).copied().unwrap_or(0);
        if declared != actual {
            println!(
                "    {} Descriptor {} declara {} enlaces pero lo referencian {}",
                "[ERROR]".red(),
                index,
                declared,
                actual
            );
            errors += 1;
        }
    }

    // 5. Veredicto
    if errors == 0 {
        println!("\n{}", ">> EL SISTEMA DE ARCHIVOS ESTÁ SANO".bold().green());
    } else {
        println!(
            "\n{} Se encontraron {} errores graves.",
            ">> PRECAUCIÓN:".bold().red(),
            errors
        );
        std::process::exit(1);
    }

    Ok(())
}
