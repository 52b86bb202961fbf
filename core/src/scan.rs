use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

/// Recursively collects DICOM files under a directory
///
/// Accepts `.dcm`/`.dicom` extensions (case-insensitive); files without an
/// extension are probed for the DICM magic header. The result is sorted so
/// downstream passes are deterministic regardless of readdir order.
pub fn collect_dicom_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(directory, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_into(&path, files)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.eq_ignore_ascii_case("dcm") || ext.eq_ignore_ascii_case("dicom") {
                    files.push(path);
                }
            } else if is_dicom_file(&path) {
                files.push(path);
            }
        }
    }
    Ok(())
}

/// Checks if a file has a DICOM header
///
/// DICOM files typically have a 128-byte preamble followed by the 4-byte
/// "DICM" magic string at offset 128.
pub fn is_dicom_file(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut buffer = [0u8; 132];
    match file.read(&mut buffer) {
        Ok(n) if n >= 132 => &buffer[128..132] == b"DICM",
        _ => false,
    }
}

/// Streaming whole-file xxh3 digest
pub fn xxh3_file(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buffer = [0u8; 65536];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.digest())
}
