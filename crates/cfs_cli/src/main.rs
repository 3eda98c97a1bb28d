use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cfs_lib::{FileStateStore, FileSystem, TruncateOutcome};

/// Sistema de archivos de juguete dentro de un archivo contenedor.
/// Cada subcomando monta el estado de la invocación anterior, ejecuta
/// una operación y termina.
#[derive(Parser, Debug)]
#[command(name = "cfs", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Formatea un archivo como contenedor nuevo
    Format {
        #[arg(value_name = "ARCHIVO")]
        file_name: PathBuf,
        /// Tamaño total del contenedor en bytes
        #[arg(short, long)]
        size: u64,
        /// Tamaño de bloque en bytes
        #[arg(short, long, default_value_t = 512)]
        block_size: u32,
        /// Cantidad máxima de archivos
        #[arg(short, long, default_value_t = 16)]
        descriptors_count: u32,
    },
    /// Monta un contenedor ya formateado
    Mount {
        #[arg(value_name = "ARCHIVO")]
        file_name: PathBuf,
    },
    /// Desmonta el contenedor actual
    Umount,
    /// Crea un archivo vacío
    Create { file_name: String },
    /// Crea un enlace adicional hacia un archivo existente
    Link {
        file_name: String,
        link_name: String,
    },
    /// Elimina un enlace (y el archivo, si era el último)
    Unlink { link_name: String },
    /// Abre un archivo y devuelve su fd
    Open { file_name: String },
    /// Cierra un fd
    Close { fd: u32 },
    /// Cierra todos los archivos abiertos
    CloseAll,
    /// Lee bytes de un archivo abierto
    Read {
        fd: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        #[arg(short, long)]
        size: u64,
    },
    /// Escribe en un archivo abierto lo que llegue por stdin
    Write {
        fd: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
    },
    /// Cambia el tamaño de un archivo
    Truncate {
        file_name: String,
        #[arg(short, long)]
        size: u64,
    },
    /// Lista los archivos del contenedor
    #[command(alias = "ls")]
    List,
    /// Muestra los atributos de un archivo
    Filestat { file_name: String },
    /// Muestra el resumen del sistema montado
    Info,
}

/// Dónde persiste el estado entre invocaciones (ruta montada + abiertos).
fn state_path() -> PathBuf {
    if let Some(path) = std::env::var_os("CFS_STATE_FILE") {
        return PathBuf::from(path);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".cfs_state");
    }
    std::env::temp_dir().join("cfs_state")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let state_path = state_path();
    log::debug!("estado persistido en {:?}", state_path);
    let store = FileStateStore::new(state_path);
    let mut fs = FileSystem::restore(Box::new(store))?;

    match cli.command {
        Command::Format { file_name, size, block_size, descriptors_count } => {
            fs.format(&file_name, size, block_size, descriptors_count)?;
            println!("Archivo {:?} formateado como sistema de archivos", file_name);
        }
        Command::Mount { file_name } => {
            fs.mount(&file_name)?;
            println!("Sistema de archivos {:?} montado", file_name);
        }
        Command::Umount => {
            let path = fs.umount()?;
            println!("Sistema de archivos {:?} desmontado", path);
        }
        Command::Create { file_name } => {
            fs.create(&file_name)?;
            println!("Archivo '{}' creado", file_name);
        }
        Command::Link { file_name, link_name } => {
            fs.link(&file_name, &link_name)?;
            println!("Enlace '{}' -> '{}' creado", link_name, file_name);
        }
        Command::Unlink { link_name } => {
            fs.unlink(&link_name)?;
            println!("Enlace '{}' eliminado", link_name);
        }
        Command::Open { file_name } => {
            let fd = fs.open(&file_name)?;
            println!("Archivo abierto con el descriptor {}", fd);
        }
        Command::Close { fd } => {
            fs.close(fd)?;
            println!("Descriptor {} cerrado", fd);
        }
        Command::CloseAll => {
            fs.close_all()?;
            println!("Todos los archivos cerrados");
        }
        Command::Read { fd, offset, size } => {
            let data = fs.read(fd, offset, size)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        Command::Write { fd, offset } => {
            // El payload llega por stdin, como en un pipe normal
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            fs.write(fd, offset, &data)?;
            println!("{} bytes escritos", data.len());
        }
        Command::Truncate { file_name, size } => {
            match fs.truncate(&file_name, size)? {
                TruncateOutcome::Unchanged => {
                    println!("La cantidad de bloques no cambió (tamaño actualizado)")
                }
                _ => println!("Tamaño de '{}' cambiado a {} bytes", file_name, size),
            }
        }
        Command::List => {
            for entry in fs.list()? {
                let marker = if entry.is_opened { "*" } else { " " };
                println!("{:<5}{}{}", entry.descriptor_index, marker, entry.name);
            }
        }
        Command::Filestat { file_name } => {
            let stat = fs.filestat(&file_name)?;
            println!("Archivo '{}':", stat.name);
            println!("\tTamaño             - {}B", stat.file_size);
            println!("\tDescriptor         - {}", stat.descriptor_index);
            println!("\tBloques usados     - {}", stat.blocks_count);
            println!("\tEnlaces            - {}", stat.links_count);
        }
        Command::Info => {
            println!("{}", fs.describe()?);
        }
    }

    Ok(())
}
