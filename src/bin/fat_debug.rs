//! Host-side inspection tool: mounts a FAT disk image, dumps the decoded
//! boot sector, walks the directory tree, and optionally prints one file.

use std::fs::File;
use std::os::unix::prelude::FileExt;

use fat::{
    probe, BlockDeviceDriver, DirectoryHandle, FatError, FatVolume, SectorIndex, SectorSize,
    VolumeIdentity,
};

const SECTOR_SIZE: u16 = 512;

fn main() {
    // Get command line arguments: a FAT disk file and an optional path to
    // print, e.g. `fat-debug disk.img BOOT/KERNEL.ELF`.
    let args: Vec<String> = std::env::args().collect();
    let (disk_file, path) = match &args[..] {
        [_, disk_file] => (disk_file, None),
        [_, disk_file, path] => (disk_file, Some(path)),
        _ => {
            eprintln!("Usage: {} <disk_file> [path/to/file]", args[0]);
            std::process::exit(1);
        }
    };

    // Read a FAT disk file
    println!("Reading FAT disk file: {disk_file}");
    let file = File::open(disk_file).expect("failed to open disk file");

    let mut reader = genio::std_impls::GenioIo::new(&file);
    let boot_sector: fat::BootSector =
        fat::read_raw(&mut reader).expect("failed to read boot sector");
    println!("Boot sector: {boot_sector:#X?}");

    let mut disk = FileDisk { file };
    probe(&mut disk).expect("no FAT filesystem on this image");

    let mut volume = FatVolume::mount(disk).expect("failed to mount");
    println!("Geometry: {:#?}", volume.geometry());
    if let Some(hint) = volume.free_space_hint() {
        println!("Free space hint: {hint:?}");
    }

    let sector0 = volume
        .device()
        .file
        .read_at_exactly(0, 512)
        .expect("failed to re-read sector 0");
    if let Some(identity) = VolumeIdentity::from_boot_sector(&sector0) {
        println!(
            "Volume: \"{}\" serial {:08X}",
            identity.label_str(),
            identity.serial
        );
    }

    match path {
        Some(path) => print_file(&mut volume, path),
        None => {
            println!("/");
            let root = volume.open_root_directory();
            list_tree(&mut volume, root, 1);
        }
    }
}

fn list_tree(volume: &mut FatVolume<FileDisk>, mut dir: DirectoryHandle, depth: usize) {
    loop {
        let info = match volume.iter_directory(&mut dir) {
            Ok(info) => info,
            Err(FatError::EndOfList) => return,
            Err(err) => {
                eprintln!("directory iteration failed: {err}");
                std::process::exit(1);
            }
        };

        let marker = if info.is_directory() { "/" } else { "" };
        let modified = info.entry.modified_date;
        let modified_time = info.entry.modified_time;
        println!(
            "{:indent$}{}{marker}  {} bytes  {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            "",
            info.name,
            info.size,
            modified.year(),
            modified.month(),
            modified.day(),
            modified_time.hour(),
            modified_time.minute(),
            modified_time.second(),
            indent = depth * 2,
        );

        if info.is_directory() && info.name != "." && info.name != ".." {
            let child = volume
                .open_directory(&mut dir, &info.name)
                .expect("failed to open listed subdirectory");
            list_tree(volume, child, depth + 1);
        }
    }
}

fn print_file(volume: &mut FatVolume<FileDisk>, path: &str) {
    let mut dir = volume.open_root_directory();
    let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();

    while let Some(component) = components.next() {
        if components.peek().is_some() {
            dir = volume
                .open_directory(&mut dir, component)
                .expect("failed to open path component");
            continue;
        }

        let mut file = volume.open(&mut dir, component).expect("failed to open file");
        let mut contents = vec![0_u8; file.size() as usize];
        let mut filled = 0;
        while filled < contents.len() {
            match volume.read(&mut file, &mut contents[filled..]) {
                Ok(count) => filled += count,
                Err(err) => {
                    eprintln!("read failed at offset {filled}: {err}");
                    std::process::exit(1);
                }
            }
        }

        println!("{}", String::from_utf8_lossy(&contents));
    }
}

/// Block device over an ordinary disk-image file.
#[derive(Debug)]
struct FileDisk {
    file: File,
}

impl BlockDeviceDriver for FileDisk {
    fn sector_size(&self) -> SectorSize {
        SectorSize::new(SECTOR_SIZE)
    }

    fn read_sectors(&mut self, start: SectorIndex, count: usize) -> Result<Vec<u8>, FatError> {
        self.file
            .read_at_exactly(
                u64::from(start) * u64::from(SECTOR_SIZE),
                count * usize::from(SECTOR_SIZE),
            )
            .map_err(|_| FatError::UnknownError)
    }

    fn write_sectors(&mut self, start: SectorIndex, data: &[u8]) -> Result<(), FatError> {
        self.file
            .write_all_at(data, u64::from(start) * u64::from(SECTOR_SIZE))
            .map_err(|_| FatError::UnknownError)
    }
}

trait ReadAtExactly {
    fn read_at_exactly(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;
}

impl ReadAtExactly for File {
    fn read_at_exactly(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}
